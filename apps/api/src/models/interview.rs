use serde::{Deserialize, Serialize};

/// One interview question with its reference answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// Evaluation of a candidate's answer. `rating` is always within 1..=10.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFeedback {
    pub rating: u8,
    pub feedback: String,
}

/// Where a structured result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSource {
    /// Produced by a model and normalized.
    Generated { model: String },
    /// Template substitute; `reason` is the error code that triggered it.
    Fallback { reason: String },
}

impl ContentSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ContentSource::Fallback { .. })
    }
}
