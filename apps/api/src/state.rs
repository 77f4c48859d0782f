use crate::config::Config;
use crate::llm_client::LlmClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The one AI client; owns the shared rate limiter and model cascade.
    pub llm: LlmClient,
    pub config: Config,
}
