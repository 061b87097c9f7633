//! Collaborator interfaces.
//!
//! The session talks to the outside world through two independent seams:
//! an [`IntentClassifier`] that turns a question into an [`Intent`], and a
//! [`Phraser`] that turns a result record into prose. The LLM-backed
//! implementations of both sit on top of a [`CompletionService`].

use crate::models::{Context, Intent, ResultRecord};
use anyhow::Result;
use async_trait::async_trait;

/// A text-completion service: one prompt in, one completion out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send `prompt` and return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Human-readable description for logs ("ollama:llama3.2:latest").
    fn describe(&self) -> String;
}

/// Everything a classifier may look at for one question.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRequest<'a> {
    pub question: &'a str,
    pub context: &'a Context,
    /// Family names present in the loaded table.
    pub families: &'a [String],
}

/// Maps a question to a structured intent.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify a question.
    ///
    /// Unparseable collaborator output must come back as `Ok(Intent::help())`;
    /// only transport failures are errors.
    async fn classify(&self, request: ClassifyRequest<'_>) -> Result<Intent>;
}

/// Turns an anonymized result record into a short answer for the user.
#[async_trait]
pub trait Phraser: Send + Sync {
    async fn phrase(&self, result: &ResultRecord) -> Result<String>;
}
