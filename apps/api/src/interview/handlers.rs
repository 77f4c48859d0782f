//! Axum route handlers for the Interview API.

use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::interview::feedback::{evaluate_answer, AnswerEvaluation, FeedbackRequest};
use crate::interview::questions::{generate_questions, QuestionRequest, QuestionSet};
use crate::state::AppState;

/// POST /api/v1/interviews/questions
///
/// Generates a mock interview for the role. Falls back to templated questions when
/// the AI is unavailable, so only invalid input produces an error.
pub async fn handle_generate_questions(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<QuestionSet>, AppError> {
    let set = generate_questions(&state.llm, request, state.config.question_count).await?;
    Ok(Json(set))
}

/// POST /api/v1/interviews/feedback
///
/// Rates one recorded answer against the reference answer.
pub async fn handle_evaluate_answer(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<AnswerEvaluation>, AppError> {
    let evaluation = evaluate_answer(&state.llm, request).await?;
    Ok(Json(evaluation))
}
