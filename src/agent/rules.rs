//! Keyword classifier used when no language model is available.
//!
//! Questions are folded (lower case, no accents) and matched against a
//! fixed set of patterns. The most specific operations are tried first:
//! family rankings, recommendations, month rankings and explanations,
//! then months, families and bare years. Anything else is `ayuda`; the
//! resolver fills anaphoric references afterwards.

use crate::agent::traits::{ClassifyRequest, IntentClassifier};
use crate::models::{fold_text, Action, Intent, Month};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2})\b").unwrap());

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]+\.?").unwrap());

static TOP_FAMILIES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(top|mejores|principales|mas vendid\w*|ranking)\b.*\bfamilias?\b|\bfamilias?\b.*\b(mas vendid\w*|top)\b").unwrap()
});

static TOP_K_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\btop\s*(\d{1,3})\b|\b(\d{1,3})\s+(?:mejores\s+|principales\s+)?familias\b").unwrap()
});

static RECOMMEND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(recomiend\w*|recomendaci\w*|suger\w*|sugier\w*|estrategi\w*|consejo\w*|que (hago|deberia|debo|me recomiendas)|recommend\w*|suggest\w*)\b").unwrap()
});

static MONTHLY_SUMMARY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(resumen mensual|resumen por mes|top\s*\d*\s*meses|mejores meses|mejor mes|peor mes|ranking de meses|meses con mas)\b").unwrap()
});

static EXPLANATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(explica\w*|por que|a que se debe|explain)\b").unwrap()
});

/// Deterministic keyword implementation of the intent rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify without any I/O.
    pub fn classify_text(&self, question: &str, families: &[String]) -> Intent {
        let folded = fold_text(question);
        let year = extract_year(&folded);

        let with_year = |intent: Intent| match year {
            Some(y) => intent.with_year(y),
            None => intent,
        };

        if TOP_FAMILIES_PATTERN.is_match(&folded) {
            let intent = with_year(Intent::new(Action::TopFamilies));
            return match extract_k(&folded) {
                Some(k) => intent.with_k(k),
                None => intent,
            };
        }

        if RECOMMEND_PATTERN.is_match(&folded) {
            return Intent::new(Action::Recommendation);
        }

        if MONTHLY_SUMMARY_PATTERN.is_match(&folded) {
            return with_year(Intent::new(Action::MonthlySummary));
        }

        if EXPLANATION_PATTERN.is_match(&folded) {
            return Intent::new(Action::Explanation);
        }

        if let Some(month) = extract_month(&folded) {
            return with_year(Intent::new(Action::SalesByMonth).with_month(month.key()));
        }

        if let Some(family) = extract_family(&folded, families) {
            return with_year(Intent::new(Action::FamilyAverage).with_family(family));
        }

        if let Some(y) = year {
            return Intent::new(Action::SalesByYear).with_year(y);
        }

        Intent::help()
    }
}

#[async_trait]
impl IntentClassifier for RuleBasedClassifier {
    async fn classify(&self, request: ClassifyRequest<'_>) -> Result<Intent> {
        Ok(self.classify_text(request.question, request.families))
    }
}

fn extract_year(folded: &str) -> Option<i32> {
    YEAR_PATTERN
        .captures(folded)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_k(folded: &str) -> Option<i64> {
    let caps = TOP_K_PATTERN.captures(folded)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

fn extract_month(folded: &str) -> Option<Month> {
    WORD_PATTERN
        .find_iter(folded)
        .find_map(|word| Month::from_word(word.as_str()))
}

/// Longest known family whose folded name appears in the question.
fn extract_family(folded: &str, families: &[String]) -> Option<String> {
    families
        .iter()
        .filter(|family| {
            let name = fold_text(family.trim());
            !name.is_empty() && contains_word(folded, &name)
        })
        .max_by_key(|family| family.len())
        .cloned()
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
