//! Remote provider: Google Gemini `generateContent`.
//!
//! Failure classes come from the structured `error.status` / `error.details[].reason` fields of
//! the API's error body, falling back to the HTTP status when the body is not JSON.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm_client::provider::{
    classify_transport_error, ModelDescriptor, Provider, ProviderError, ProviderKind, ResponseMode,
};

pub const DEFAULT_MODELS: &[&str] = &["gemini-1.5-flash", "gemini-1.5-pro", "gemini-pro"];

/// Models that predate `responseMimeType: application/json`.
const TEXT_ONLY_MODELS: &[&str] = &["gemini-pro", "gemini-1.0-pro"];

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    reason: Option<String>,
}

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client for Gemini")?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }

    fn default_models(&self) -> Vec<String> {
        DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn supports_json(&self, model: &str) -> bool {
        !TEXT_ONLY_MODELS.contains(&model)
    }

    async fn call(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        mode: ResponseMode,
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Auth("GEMINI_API_KEY is not set".to_string())
        })?;

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, model.name
            ))
            .header("x-goog-api-key", api_key)
            .json(&build_request(prompt, mode))
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body, mode));
        }

        let generated: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Malformed Gemini response: {e}")))?;

        let text = generated.text().ok_or_else(|| {
            ProviderError::Transient(format!("Gemini model {} returned no text", model.name))
        })?;

        debug!("Gemini call succeeded: model={}, chars={}", model.name, text.len());
        Ok(text)
    }

    async fn check_availability(&self) -> bool {
        self.api_key.is_some()
    }
}

fn build_request(prompt: &str, mode: ResponseMode) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: GenerationConfig {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
            response_mime_type: match mode {
                ResponseMode::Json => "application/json",
                ResponseMode::Text => "text/plain",
            },
        },
        safety_settings: SAFETY_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: "BLOCK_MEDIUM_AND_ABOVE",
            })
            .collect(),
    }
}

/// Maps a non-success API response to a failure class.
///
/// An invalid-argument rejection only counts as a missing capability when the call asked for
/// JSON output; in text mode the request itself is at fault.
fn classify_error(status: u16, body: &str, mode: ResponseMode) -> ProviderError {
    let Ok(parsed) = serde_json::from_str::<GeminiError>(body) else {
        return classify_status(status, format!("Gemini API error {status}: {body}"), mode);
    };

    let error = parsed.error;
    let message = format!("Gemini API error {status} ({}): {}", error.status, error.message);
    let key_invalid = error
        .details
        .iter()
        .any(|d| d.reason.as_deref() == Some("API_KEY_INVALID"));

    match error.status.as_str() {
        _ if key_invalid => ProviderError::Auth(message),
        "RESOURCE_EXHAUSTED" => ProviderError::RateLimited(message),
        "NOT_FOUND" => ProviderError::NotFound(message),
        "UNAUTHENTICATED" | "PERMISSION_DENIED" => ProviderError::Auth(message),
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" => rejected(message, mode),
        _ => classify_status(status, message, mode),
    }
}

fn classify_status(status: u16, message: String, mode: ResponseMode) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited(message),
        404 => ProviderError::NotFound(message),
        401 | 403 => ProviderError::Auth(message),
        400 => rejected(message, mode),
        _ => ProviderError::Transient(message),
    }
}

fn rejected(message: String, mode: ResponseMode) -> ProviderError {
    match mode {
        ResponseMode::Json => ProviderError::Unsupported(message),
        ResponseMode::Text => ProviderError::BadRequest(message),
    }
}
