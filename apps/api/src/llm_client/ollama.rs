//! Local provider: an Ollama daemon reached over HTTP.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm_client::provider::{
    classify_transport_error, ModelDescriptor, Provider, ProviderError, ProviderKind, ResponseMode,
};

pub const DEFAULT_MODEL: &str = "phi3:mini";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client for Ollama")?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn default_models(&self) -> Vec<String> {
        vec![DEFAULT_MODEL.to_string()]
    }

    async fn call(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        mode: ResponseMode,
    ) -> Result<String, ProviderError> {
        let body = build_request(&model.name, prompt, mode);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body, mode));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Malformed Ollama response: {e}")))?;

        debug!(
            "Ollama call succeeded: model={}, chars={}",
            model.name,
            generated.response.len()
        );

        Ok(generated.response)
    }

    async fn check_availability(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Ollama availability check failed: {e}");
                false
            }
        }
    }
}

fn build_request<'a>(model: &'a str, prompt: &'a str, mode: ResponseMode) -> GenerateRequest<'a> {
    GenerateRequest {
        model,
        prompt,
        stream: false,
        format: match mode {
            ResponseMode::Json => Some("json"),
            ResponseMode::Text => None,
        },
        options: GenerateOptions {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
        },
    }
}

/// Maps a non-success daemon response to a failure class.
///
/// A 400 is a capability gap only for JSON calls (the `format` option); otherwise the request
/// itself was refused.
fn classify_status(status: u16, body: &str, mode: ResponseMode) -> ProviderError {
    let message = serde_json::from_str::<OllamaError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string());
    let message = format!("Ollama API error {status}: {message}");

    match status {
        404 => ProviderError::NotFound(message),
        429 => ProviderError::RateLimited(message),
        401 | 403 => ProviderError::Auth(message),
        400 if mode == ResponseMode::Json => ProviderError::Unsupported(message),
        400..=499 => ProviderError::BadRequest(message),
        _ => ProviderError::Transient(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_mode_sets_format() {
        let body = serde_json::to_value(build_request("phi3:mini", "hi", ResponseMode::Json))
            .unwrap();
        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["top_k"], 40);
    }

    #[test]
    fn test_text_mode_omits_format() {
        let body = serde_json::to_value(build_request("phi3:mini", "hi", ResponseMode::Text))
            .unwrap();
        assert!(body.get("format").is_none());
        assert_eq!(body["model"], "phi3:mini");
    }

    #[test]
    fn test_missing_model_is_not_found() {
        let err = classify_status(404, r#"{"error":"model 'llama9' not found, try pulling it first"}"#, ResponseMode::Json);
        match err {
            ProviderError::NotFound(msg) => assert!(msg.contains("llama9")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(classify_status(429, "", ResponseMode::Json), ProviderError::RateLimited(_)));
        assert!(matches!(classify_status(401, "", ResponseMode::Json), ProviderError::Auth(_)));
        assert!(matches!(classify_status(400, "bad format", ResponseMode::Json), ProviderError::Unsupported(_)));
        assert!(matches!(classify_status(500, "boom", ResponseMode::Json), ProviderError::Transient(_)));
        assert!(matches!(classify_status(503, "", ResponseMode::Json), ProviderError::Transient(_)));
    }

    #[test]
    fn test_client_errors_in_text_mode_are_bad_requests() {
        let err = classify_status(400, r#"{"error":"prompt too long"}"#, ResponseMode::Text);
        assert!(matches!(err, ProviderError::BadRequest(ref msg) if msg.contains("prompt too long")));
        assert!(matches!(
            classify_status(422, "", ResponseMode::Json),
            ProviderError::BadRequest(_)
        ));
        assert!(matches!(
            classify_status(404, "", ResponseMode::Text),
            ProviderError::NotFound(_)
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let provider =
            OllamaProvider::new("http://localhost:11434/", Duration::from_secs(5)).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434");
    }
}
