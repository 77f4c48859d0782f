pub mod ai;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::interview::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // AI client
        .route("/api/v1/ai/status", get(ai::handle_ai_status))
        .route("/api/v1/ai/messages", post(ai::handle_send_message))
        // Interview API
        .route(
            "/api/v1/interviews/questions",
            post(handlers::handle_generate_questions),
        )
        .route(
            "/api/v1/interviews/feedback",
            post(handlers::handle_evaluate_answer),
        )
        .with_state(state)
}
