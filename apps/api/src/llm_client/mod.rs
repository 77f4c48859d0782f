//! LLM Client: the single point of entry for all text-generation calls in mockprep.
//!
//! ARCHITECTURAL RULE: No other module may call a model provider directly.
//! All model interactions MUST go through `LlmClient::send_message`, which applies the shared
//! rate limiter and the model fallback cascade.
//!
//! Provider (local Ollama or remote Gemini) is selected once at startup from `AI_PROVIDER`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

pub mod cascade;
pub mod gemini;
pub mod normalizer;
pub mod ollama;
pub mod prompts;
pub mod provider;
pub mod rate_limiter;
#[cfg(test)]
pub(crate) mod testing;

use cascade::{Completion, ModelFallbackCascade};
use gemini::GeminiProvider;
use ollama::OllamaProvider;
use provider::{ModelDescriptor, Provider, ProviderKind, ResponseMode};
use rate_limiter::{RateLimitStats, RateLimiter};

/// Failure taxonomy surfaced to callers. Branch on the variant (or `code()`), never on the text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiError {
    #[error("AI quota exceeded (models tried: {})", .models_tried.join(", "))]
    RateLimited { models_tried: Vec<String> },

    #[error("AI credentials rejected: {0}. Check the provider API key")]
    AuthInvalid(String),

    #[error("No usable AI model (models tried: {})", .models_tried.join(", "))]
    ModelUnavailable { models_tried: Vec<String> },

    #[error("Could not parse AI response: {0}")]
    ParseFailure(String),

    #[error("AI provider rejected the request: {0}")]
    Rejected(String),

    #[error("AI service unavailable: {message} (models tried: {})", .models_tried.join(", "))]
    Transient {
        message: String,
        models_tried: Vec<String>,
    },
}

impl AiError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AiError::RateLimited { .. } => "AI_QUOTA_EXCEEDED",
            AiError::AuthInvalid(_) => "AI_AUTH_INVALID",
            AiError::ModelUnavailable { .. } => "AI_MODEL_UNAVAILABLE",
            AiError::ParseFailure(_) => "AI_PARSE_FAILURE",
            AiError::Rejected(_) => "AI_REQUEST_REJECTED",
            AiError::Transient { .. } => "AI_UNAVAILABLE",
        }
    }
}

/// Per-call options for `send_message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Ask the provider for structured (JSON) output.
    pub json: bool,
}

impl SendOptions {
    pub fn json() -> Self {
        Self { json: true }
    }

    fn mode(&self) -> ResponseMode {
        if self.json {
            ResponseMode::Json
        } else {
            ResponseMode::Text
        }
    }
}

/// Successful response of `send_message`.
#[derive(Debug, Clone)]
pub struct AiResponse {
    completion: Completion,
}

impl AiResponse {
    /// Raw text produced by the model. Callers normalize it themselves.
    pub fn text(&self) -> &str {
        &self.completion.text
    }

    pub fn model(&self) -> &str {
        &self.completion.model
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    pub fn into_completion(self) -> Completion {
        self.completion
    }
}

/// The single AI client used by all services in mockprep.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn Provider>,
    cascade: Arc<ModelFallbackCascade>,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>, cascade: ModelFallbackCascade) -> Self {
        Self {
            provider,
            cascade: Arc::new(cascade),
        }
    }

    /// Builds the provider selected by `AI_PROVIDER`, one shared rate limiter and the cascade.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let provider: Arc<dyn Provider> = match config.ai_provider {
            ProviderKind::Local => Arc::new(OllamaProvider::new(&config.ollama_api_url, timeout)?),
            ProviderKind::Remote => Arc::new(GeminiProvider::new(
                &config.gemini_api_url,
                config.gemini_api_key.clone(),
                timeout,
            )?),
        };

        let names = if config.ai_models.is_empty() {
            provider.default_models()
        } else {
            config.ai_models.clone()
        };
        let models = ModelDescriptor::list_from_names(&names, |name| provider.supports_json(name));

        let limiter = Arc::new(RateLimiter::new(config.rate_limit_per_minute));
        let cascade = ModelFallbackCascade::new(models, config.max_retries, limiter)
            .remember_last_good(config.remember_last_model);

        info!(
            "AI provider: {} (models: {}, {} requests/min, {} retries)",
            provider.kind(),
            names.join(", "),
            config.rate_limit_per_minute,
            config.max_retries
        );

        Ok(Self::new(provider, cascade))
    }

    /// Sends one prompt through the cascade and returns the first successful raw text.
    pub async fn send_message(
        &self,
        prompt: &str,
        options: SendOptions,
    ) -> Result<AiResponse, AiError> {
        let completion = self
            .cascade
            .run(self.provider.as_ref(), prompt, options.mode())
            .await?;
        Ok(AiResponse { completion })
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        self.cascade.models()
    }

    /// Local: the daemon answers. Remote: an API key is configured.
    pub async fn check_availability(&self) -> bool {
        self.provider.check_availability().await
    }

    pub async fn rate_limit_stats(&self) -> RateLimitStats {
        self.cascade.limiter().stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::provider::ProviderError;
    use crate::llm_client::testing::ScriptedProvider;

    fn client(provider: ScriptedProvider, models: &[&str]) -> LlmClient {
        let cascade = ModelFallbackCascade::new(
            ModelDescriptor::list_from_names(models, |_| true),
            3,
            Arc::new(RateLimiter::new(15)),
        );
        LlmClient::new(Arc::new(provider), cascade)
    }

    fn test_config(provider: &str) -> Config {
        let provider = provider.to_string();
        Config::from_vars(move |key| match key {
            "AI_PROVIDER" => Some(provider.clone()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_message_returns_text() {
        let client = client(ScriptedProvider::new(|_, _, _| Ok("hello".into())), &["m"]);
        let response = client.send_message("hi", SendOptions::default()).await.unwrap();
        assert_eq!(response.text(), "hello");
        assert_eq!(response.model(), "m");
        assert_eq!(response.completion().mode, ResponseMode::Text);
    }

    #[tokio::test]
    async fn test_json_option_requests_json_mode() {
        let provider = Arc::new(ScriptedProvider::new(|_, mode, _| {
            assert_eq!(mode, ResponseMode::Json);
            Ok("{}".into())
        }));
        let cascade = ModelFallbackCascade::new(
            ModelDescriptor::list_from_names(&["m"], |_| true),
            3,
            Arc::new(RateLimiter::new(15)),
        );
        let client = LlmClient::new(provider.clone(), cascade);

        client.send_message("hi", SendOptions::json()).await.unwrap();
        assert_eq!(provider.calls(), vec![("m".to_string(), ResponseMode::Json)]);
    }

    #[tokio::test]
    async fn test_auth_error_surfaces_with_code() {
        let client = client(
            ScriptedProvider::new(|_, _, _| Err(ProviderError::Auth("key rejected".into()))),
            &["m"],
        );
        let err = client.send_message("hi", SendOptions::json()).await.unwrap_err();
        assert_eq!(err.code(), "AI_AUTH_INVALID");
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn test_admissions_are_counted_per_attempt() {
        let client = client(ScriptedProvider::new(|_, _, _| Ok("x".into())), &["m"]);
        client.send_message("a", SendOptions::default()).await.unwrap();
        client.send_message("b", SendOptions::default()).await.unwrap();
        let stats = client.rate_limit_stats().await;
        assert_eq!(stats.requests_in_window, 2);
        assert_eq!(stats.remaining_requests, 13);
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            AiError::RateLimited { models_tried: vec![] },
            AiError::AuthInvalid(String::new()),
            AiError::ModelUnavailable { models_tried: vec![] },
            AiError::ParseFailure(String::new()),
            AiError::Rejected(String::new()),
            AiError::Transient {
                message: String::new(),
                models_tried: vec![],
            },
        ];
        let mut codes: Vec<_> = errors.iter().map(AiError::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_error_message_lists_models() {
        let err = AiError::RateLimited {
            models_tried: vec!["gemini-1.5-flash".into(), "gemini-pro".into()],
        };
        assert_eq!(
            err.to_string(),
            "AI quota exceeded (models tried: gemini-1.5-flash, gemini-pro)"
        );
    }

    #[test]
    fn test_from_config_uses_provider_defaults() {
        let local = LlmClient::from_config(&test_config("local")).unwrap();
        assert_eq!(local.provider_kind(), ProviderKind::Local);
        assert_eq!(local.models()[0].name, ollama::DEFAULT_MODEL);

        let remote = LlmClient::from_config(&test_config("remote")).unwrap();
        assert_eq!(remote.provider_kind(), ProviderKind::Remote);
        let names: Vec<_> = remote.models().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, gemini::DEFAULT_MODELS.to_vec());
        // gemini-pro has no JSON output mode
        assert!(!remote.models()[2].supports_json);
    }
}
