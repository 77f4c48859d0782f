//! Model fallback cascade: ordered failover across model variants with classified retries.
//!
//! The decision logic is the pure `transition` function; `ModelFallbackCascade::run` only performs
//! the I/O it asks for (admitted provider call, backoff sleep).
//!
//! Rules per attempt outcome:
//! - success            → complete
//! - not found          → next model, no budget spent, no backoff
//! - unsupported        → next model, no budget spent, no backoff
//! - auth               → fail immediately
//! - rate limited       → same model after min(30, 2^n * 2)s
//! - transient          → same model after 2^(n-1)s
//!
//! `n` counts budget-consuming failures over the whole traversal. Once `max_retries` is spent the
//! cascade moves on to the next model (one attempt each) and reports exhaustion at the end of the list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::llm_client::provider::{ModelDescriptor, Provider, ProviderError, ResponseMode};
use crate::llm_client::rate_limiter::RateLimiter;
use crate::llm_client::AiError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
const MAX_RATE_LIMIT_BACKOFF_SECS: u64 = 30;

// ────────────────────────────────────────────────────────────────────────────
// State machine
// ────────────────────────────────────────────────────────────────────────────

/// Result of one provider attempt, as seen by the cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    Retryable(ProviderError),
    NonRetryable(ProviderError),
    /// The model lacks the requested capability (structured output).
    Unsupported,
}

impl AttemptOutcome {
    pub fn from_result(result: Result<String, ProviderError>) -> Self {
        match result {
            Ok(text) => AttemptOutcome::Success(text),
            Err(e @ (ProviderError::RateLimited(_) | ProviderError::Transient(_))) => {
                AttemptOutcome::Retryable(e)
            }
            Err(ProviderError::Unsupported(_)) => AttemptOutcome::Unsupported,
            Err(e) => AttemptOutcome::NonRetryable(e),
        }
    }
}

/// Per-call cascade state. Created fresh for every `send_message`.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeState {
    /// Model index the traversal started from.
    pub start: usize,
    /// Offset from `start`; the traversal wraps around the list.
    pub cursor: usize,
    pub model_count: usize,
    /// Budget-consuming failures so far.
    pub attempts: u32,
    pub mode: ResponseMode,
    pub downgraded: bool,
    pub saw_unsupported: bool,
    pub last_error: Option<ProviderError>,
    pub models_tried: Vec<String>,
}

impl CascadeState {
    pub fn new(start: usize, model_count: usize, mode: ResponseMode) -> Self {
        Self {
            start,
            cursor: 0,
            model_count,
            attempts: 0,
            mode,
            downgraded: false,
            saw_unsupported: false,
            last_error: None,
            models_tried: Vec::new(),
        }
    }

    pub fn model_index(&self) -> usize {
        (self.start + self.cursor) % self.model_count.max(1)
    }

    fn record_tried(&mut self, name: &str) {
        if !self.models_tried.iter().any(|m| m == name) {
            self.models_tried.push(name.to_string());
        }
    }
}

/// What the driver must do next.
#[derive(Debug, PartialEq)]
pub enum Action {
    Complete(String),
    /// Sleep, then retry the same model.
    Backoff(Duration),
    /// Try the model at the new cursor immediately.
    Advance,
    /// Restart the traversal in plain-text mode.
    Downgrade,
    Fail(AiError),
}

pub fn rate_limit_backoff(attempt: u32) -> Duration {
    let secs = 2u64
        .saturating_pow(attempt)
        .saturating_mul(2)
        .min(MAX_RATE_LIMIT_BACKOFF_SECS);
    Duration::from_secs(secs)
}

pub fn transient_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Pure cascade transition.
pub fn transition(
    mut state: CascadeState,
    outcome: AttemptOutcome,
    max_retries: u32,
) -> (CascadeState, Action) {
    match outcome {
        AttemptOutcome::Success(text) => (state, Action::Complete(text)),
        AttemptOutcome::NonRetryable(ProviderError::Auth(message)) => {
            (state, Action::Fail(AiError::AuthInvalid(message)))
        }
        AttemptOutcome::NonRetryable(ProviderError::BadRequest(message)) => {
            (state, Action::Fail(AiError::Rejected(message)))
        }
        AttemptOutcome::NonRetryable(_) => advance_or_exhaust(state),
        AttemptOutcome::Unsupported => {
            state.saw_unsupported = true;
            advance_or_exhaust(state)
        }
        AttemptOutcome::Retryable(error) => {
            state.attempts += 1;
            let delay = match &error {
                ProviderError::RateLimited(_) => rate_limit_backoff(state.attempts),
                _ => transient_backoff(state.attempts),
            };
            state.last_error = Some(error);
            if state.attempts < max_retries {
                (state, Action::Backoff(delay))
            } else {
                advance_or_exhaust(state)
            }
        }
    }
}

fn advance_or_exhaust(mut state: CascadeState) -> (CascadeState, Action) {
    state.cursor += 1;
    if state.cursor < state.model_count {
        return (state, Action::Advance);
    }

    let only_capability_failures = state.saw_unsupported && state.last_error.is_none();
    if state.mode == ResponseMode::Json && !state.downgraded && only_capability_failures {
        state.mode = ResponseMode::Text;
        state.downgraded = true;
        state.cursor = 0;
        state.saw_unsupported = false;
        return (state, Action::Downgrade);
    }

    let error = exhausted_error(&state);
    (state, Action::Fail(error))
}

fn exhausted_error(state: &CascadeState) -> AiError {
    let models_tried = state.models_tried.clone();
    match &state.last_error {
        Some(ProviderError::RateLimited(_)) => AiError::RateLimited { models_tried },
        Some(error) => AiError::Transient {
            message: error.to_string(),
            models_tried,
        },
        None => AiError::ModelUnavailable { models_tried },
    }
}

/// Why the cascade leaves a model after `outcome`, for logging. `None` on success.
pub fn advance_reason(outcome: &AttemptOutcome) -> Option<String> {
    match outcome {
        AttemptOutcome::Success(_) => None,
        AttemptOutcome::Retryable(error) => Some(format!("retry budget spent, last {error}")),
        AttemptOutcome::NonRetryable(error) => Some(error.to_string()),
        AttemptOutcome::Unsupported => Some("no JSON output mode".to_string()),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Driver
// ────────────────────────────────────────────────────────────────────────────

/// Successful cascade result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    /// Mode that actually produced the text (may be `Text` after a downgrade).
    pub mode: ResponseMode,
    /// Provider calls issued for this request.
    pub attempts: u32,
}

pub struct ModelFallbackCascade {
    models: Vec<ModelDescriptor>,
    max_retries: u32,
    limiter: Arc<RateLimiter>,
    remember_last_good: bool,
    last_good: AtomicUsize,
}

impl ModelFallbackCascade {
    pub fn new(models: Vec<ModelDescriptor>, max_retries: u32, limiter: Arc<RateLimiter>) -> Self {
        Self {
            models,
            max_retries: max_retries.max(1),
            limiter,
            remember_last_good: true,
            last_good: AtomicUsize::new(0),
        }
    }

    /// Enables or disables starting each call at the last model that succeeded.
    pub fn remember_last_good(mut self, enabled: bool) -> Self {
        self.remember_last_good = enabled;
        self
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn run(
        &self,
        provider: &dyn Provider,
        prompt: &str,
        mode: ResponseMode,
    ) -> Result<Completion, AiError> {
        if self.models.is_empty() {
            return Err(AiError::ModelUnavailable {
                models_tried: Vec::new(),
            });
        }

        let start = if self.remember_last_good {
            self.last_good.load(Ordering::Relaxed) % self.models.len()
        } else {
            0
        };
        let mut state = CascadeState::new(start, self.models.len(), mode);
        let mut calls = 0u32;

        loop {
            let index = state.model_index();
            let model = &self.models[index];
            let attempt_mode = state.mode;
            state.record_tried(&model.name);

            let outcome = if attempt_mode == ResponseMode::Json && !model.supports_json {
                debug!("Model {} has no JSON output mode, skipping", model.name);
                AttemptOutcome::Unsupported
            } else {
                calls += 1;
                debug!(
                    "Attempt {} on model {} ({:?} mode)",
                    calls, model.name, attempt_mode
                );
                let result = self
                    .limiter
                    .run_admitted(|| provider.call(model, prompt, attempt_mode))
                    .await;
                AttemptOutcome::from_result(result)
            };

            let reason = advance_reason(&outcome);
            let (next, action) = transition(state, outcome, self.max_retries);
            state = next;

            match action {
                Action::Complete(text) => {
                    if self.remember_last_good {
                        self.last_good.store(index, Ordering::Relaxed);
                    }
                    info!("Model {} answered after {} call(s)", model.name, calls);
                    return Ok(Completion {
                        text,
                        model: model.name.clone(),
                        mode: attempt_mode,
                        attempts: calls,
                    });
                }
                Action::Backoff(delay) => {
                    warn!(
                        "Model {} failed (attempt {}/{}): {:?}, retrying after {}s...",
                        model.name,
                        state.attempts,
                        self.max_retries,
                        state.last_error,
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                }
                Action::Advance => {
                    warn!(
                        "Leaving model {} ({}), trying {}",
                        model.name,
                        reason.as_deref().unwrap_or("no reason"),
                        self.models[state.model_index()].name
                    );
                }
                Action::Downgrade => {
                    warn!("No model accepted JSON output mode, retrying the list in text mode");
                }
                Action::Fail(error) => {
                    warn!("Model cascade gave up after {} call(s): {}", calls, error);
                    return Err(error);
                }
            }
        }
    }
}
