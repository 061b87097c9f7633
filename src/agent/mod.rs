//! Language-facing collaborators.
//!
//! This module resolves questions into intents and phrases results, either
//! through a language model or with the offline rule and template
//! implementations.

pub mod intent;
pub mod llm;
pub mod phrasing;
pub mod rules;
pub mod traits;

pub use intent::{resolve, LlmIntentClassifier};
pub use llm::build_completion_service;
pub use phrasing::{LlmPhraser, TemplatePhraser};
pub use rules::RuleBasedClassifier;
pub use traits::{ClassifyRequest, CompletionService, IntentClassifier, Phraser};
