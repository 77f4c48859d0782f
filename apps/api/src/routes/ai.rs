//! Diagnostic and passthrough routes over the AI client.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::llm_client::cascade::Completion;
use crate::llm_client::provider::{ModelDescriptor, ProviderKind};
use crate::llm_client::rate_limiter::RateLimitStats;
use crate::llm_client::SendOptions;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AiStatusResponse {
    pub provider: ProviderKind,
    pub available: bool,
    pub models: Vec<ModelDescriptor>,
    pub rate_limit: RateLimitStats,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub prompt: String,
    #[serde(default)]
    pub json: bool,
}

/// GET /api/v1/ai/status
///
/// Provider, reachability, configured model order and current quota usage.
pub async fn handle_ai_status(State(state): State<AppState>) -> Json<AiStatusResponse> {
    Json(AiStatusResponse {
        provider: state.llm.provider_kind(),
        available: state.llm.check_availability().await,
        models: state.llm.models().to_vec(),
        rate_limit: state.llm.rate_limit_stats().await,
    })
}

/// POST /api/v1/ai/messages
///
/// Sends one raw prompt through the cascade. Unlike the interview routes there is
/// no fallback content: AI failures are returned as error envelopes.
pub async fn handle_send_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<Completion>, AppError> {
    if request.prompt.trim().is_empty() {
        return Err(AppError::Validation("prompt cannot be empty".to_string()));
    }

    let response = state
        .llm
        .send_message(&request.prompt, SendOptions { json: request.json })
        .await?;

    Ok(Json(response.into_completion()))
}
