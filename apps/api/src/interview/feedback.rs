//! Answer evaluation: AI rating and feedback, with a length heuristic as fallback.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::interview::fallback::fallback_feedback;
use crate::interview::prompts::feedback_prompt;
use crate::llm_client::normalizer::parse_feedback;
use crate::llm_client::{AiError, LlmClient, SendOptions};
use crate::models::interview::{AnswerFeedback, ContentSource};

/// Answers shorter than this (in characters, after trimming) are not evaluated.
pub const MIN_ANSWER_CHARS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub question: String,
    #[serde(default)]
    pub reference_answer: String,
    pub user_answer: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerEvaluation {
    pub question: String,
    pub user_answer: String,
    pub rating: u8,
    pub feedback: String,
    pub source: ContentSource,
}

/// Rates the candidate's answer from 1 to 10 with written feedback.
pub async fn evaluate_answer(
    llm: &LlmClient,
    request: FeedbackRequest,
) -> Result<AnswerEvaluation, AppError> {
    if request.question.trim().is_empty() {
        return Err(AppError::Validation("question cannot be empty".to_string()));
    }
    if request.user_answer.trim().chars().count() < MIN_ANSWER_CHARS {
        return Err(AppError::Validation(format!(
            "user_answer must be at least {MIN_ANSWER_CHARS} characters"
        )));
    }

    let prompt = feedback_prompt(
        &request.question,
        &request.reference_answer,
        &request.user_answer,
    );

    let (result, source) = match request_feedback(llm, &prompt).await {
        Ok((feedback, model)) => (feedback, ContentSource::Generated { model }),
        Err(e) => {
            warn!("Answer evaluation failed, using fallback feedback: {e}");
            let reason = e.code().to_string();
            (
                fallback_feedback(&request.user_answer),
                ContentSource::Fallback { reason },
            )
        }
    };

    info!(
        "Evaluated answer: rating {}/10 (fallback: {})",
        result.rating,
        source.is_fallback()
    );

    Ok(AnswerEvaluation {
        question: request.question,
        user_answer: request.user_answer,
        rating: result.rating,
        feedback: result.feedback,
        source,
    })
}

/// Mean of an interview's answer ratings, rounded to one decimal. `None` when nothing was rated.
pub fn overall_rating(ratings: &[u8]) -> Option<f32> {
    if ratings.is_empty() {
        return None;
    }
    let total: u32 = ratings.iter().map(|&r| u32::from(r)).sum();
    let mean = total as f32 / ratings.len() as f32;
    Some((mean * 10.0).round() / 10.0)
}

async fn request_feedback(
    llm: &LlmClient,
    prompt: &str,
) -> Result<(AnswerFeedback, String), AiError> {
    let response = llm.send_message(prompt, SendOptions::json()).await?;
    let feedback = parse_feedback(response.text())?;
    Ok((feedback, response.model().to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm_client::provider::ProviderError;
    use crate::llm_client::testing::{scripted_client, ScriptedProvider};

    fn request(answer: &str) -> FeedbackRequest {
        FeedbackRequest {
            question: "What is the borrow checker?".into(),
            reference_answer: "It enforces the aliasing and lifetime rules at compile time.".into(),
            user_answer: answer.into(),
        }
    }

    #[test]
    fn test_overall_rating_averages_to_one_decimal() {
        assert_eq!(overall_rating(&[7, 8, 8]), Some(7.7));
        assert_eq!(overall_rating(&[6, 7]), Some(6.5));
        assert_eq!(overall_rating(&[10]), Some(10.0));
        assert_eq!(overall_rating(&[1, 2, 2]), Some(1.7));
    }

    #[test]
    fn test_overall_rating_of_no_answers_is_none() {
        assert_eq!(overall_rating(&[]), None);
    }

    #[tokio::test]
    async fn test_model_feedback_is_returned() {
        let provider = Arc::new(ScriptedProvider::new(|_, _, _| {
            Ok(r#"Sure! {"rating": 8, "feedback": "Clear and accurate."}"#.into())
        }));
        let llm = scripted_client(provider, &["m1"]);

        let evaluation = evaluate_answer(&llm, request("It checks references at compile time."))
            .await
            .unwrap();
        assert_eq!(evaluation.rating, 8);
        assert_eq!(evaluation.feedback, "Clear and accurate.");
        assert_eq!(evaluation.source, ContentSource::Generated { model: "m1".into() });
    }

    #[tokio::test]
    async fn test_out_of_range_rating_is_clamped() {
        let provider = Arc::new(ScriptedProvider::new(|_, _, _| {
            Ok(r#"{"rating": 14, "feedback": "Excellent."}"#.into())
        }));
        let llm = scripted_client(provider, &["m1"]);

        let evaluation = evaluate_answer(&llm, request("It checks references at compile time."))
            .await
            .unwrap();
        assert_eq!(evaluation.rating, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_exhaustion_uses_fallback_feedback() {
        let provider = Arc::new(ScriptedProvider::new(|_, _, _| {
            Err(ProviderError::RateLimited("429".into()))
        }));
        let llm = scripted_client(provider, &["m1"]);

        let evaluation = evaluate_answer(&llm, request("It checks references at compile time."))
            .await
            .unwrap();
        assert_eq!(evaluation.rating, 3);
        assert!(evaluation.feedback.contains("AI service was unavailable"));
        assert_eq!(
            evaluation.source,
            ContentSource::Fallback {
                reason: "AI_QUOTA_EXCEEDED".into()
            }
        );
    }

    #[tokio::test]
    async fn test_feedback_without_rating_uses_fallback() {
        let provider = Arc::new(ScriptedProvider::new(|_, _, _| {
            Ok(r#"{"feedback": "Good."}"#.into())
        }));
        let llm = scripted_client(provider, &["m1"]);

        let answer = "Ownership plus borrowing rules checked statically, which removes data races \
                      and use-after-free without a garbage collector.";
        let evaluation = evaluate_answer(&llm, request(answer)).await.unwrap();
        assert_eq!(evaluation.rating, 6);
        assert!(evaluation.source.is_fallback());
    }

    #[tokio::test]
    async fn test_short_answer_is_rejected_without_calling_the_model() {
        let provider = Arc::new(ScriptedProvider::new(|_, _, _| Ok("{}".into())));
        let llm = scripted_client(provider.clone(), &["m1"]);

        let err = evaluate_answer(&llm, request("   no idea ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let llm = scripted_client(Arc::new(ScriptedProvider::down()), &["m1"]);
        let mut blank = request("A long enough answer here.");
        blank.question = String::new();

        let err = evaluate_answer(&llm, blank).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("question")));
    }
}
