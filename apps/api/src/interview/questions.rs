//! Question generation: AI first, templated questions when the AI path fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::fallback::fallback_questions;
use crate::interview::prompts::questions_prompt;
use crate::llm_client::normalizer::parse_questions;
use crate::llm_client::{AiError, LlmClient, SendOptions};
use crate::models::interview::{ContentSource, QaPair};

pub const MAX_QUESTION_COUNT: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRequest {
    pub job_position: String,
    pub job_description: String,
    pub job_experience: String,
    #[serde(default)]
    pub question_count: Option<usize>,
}

impl QuestionRequest {
    /// Checks the required fields and resolves the effective question count.
    fn validate(&self, default_count: usize) -> Result<usize, AppError> {
        for (field, value) in [
            ("job_position", &self.job_position),
            ("job_description", &self.job_description),
            ("job_experience", &self.job_experience),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} cannot be empty")));
            }
        }

        let count = self.question_count.unwrap_or(default_count);
        if !(1..=MAX_QUESTION_COUNT).contains(&count) {
            return Err(AppError::Validation(format!(
                "question_count must be between 1 and {MAX_QUESTION_COUNT}"
            )));
        }
        Ok(count)
    }
}

/// A generated mock interview, ready for the caller to persist.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionSet {
    pub interview_id: Uuid,
    pub job_position: String,
    pub job_description: String,
    pub job_experience: String,
    pub questions: Vec<QaPair>,
    pub source: ContentSource,
    pub created_at: DateTime<Utc>,
}

/// Generates interview questions for the role.
///
/// Only invalid input is an error. Any AI failure (quota, auth, no model, unparseable output)
/// degrades to the templated question bank, capped at the bank size.
pub async fn generate_questions(
    llm: &LlmClient,
    request: QuestionRequest,
    default_count: usize,
) -> Result<QuestionSet, AppError> {
    let count = request.validate(default_count)?;

    let prompt = questions_prompt(
        &request.job_position,
        &request.job_description,
        &request.job_experience,
        count,
    );

    let (questions, source) = match request_questions(llm, &prompt, count).await {
        Ok((questions, model)) => (questions, ContentSource::Generated { model }),
        Err(e) => {
            warn!("Question generation failed, using fallback questions: {e}");
            let questions = fallback_questions(
                &request.job_position,
                &request.job_description,
                &request.job_experience,
                count,
            );
            let reason = e.code().to_string();
            (questions, ContentSource::Fallback { reason })
        }
    };

    info!(
        "Generated {} questions for '{}' (fallback: {})",
        questions.len(),
        request.job_position,
        source.is_fallback()
    );

    Ok(QuestionSet {
        interview_id: Uuid::new_v4(),
        job_position: request.job_position,
        job_description: request.job_description,
        job_experience: request.job_experience,
        questions,
        source,
        created_at: Utc::now(),
    })
}

async fn request_questions(
    llm: &LlmClient,
    prompt: &str,
    count: usize,
) -> Result<(Vec<QaPair>, String), AiError> {
    let response = llm.send_message(prompt, SendOptions::json()).await?;
    let mut questions = parse_questions(response.text())?;
    questions.truncate(count);
    Ok((questions, response.model().to_string()))
}
