//! Provider seam: one async trait per transport, one tagged error per failed call.
//!
//! Providers decide the failure class at the boundary (HTTP status plus structured error body),
//! so the cascade only ever branches on `ProviderError` variants and never on message text.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Which backend the facade talks to. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Ollama daemon on the local machine.
    Local,
    /// Gemini cloud API.
    Remote,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "ollama" => Ok(ProviderKind::Local),
            "remote" | "gemini" => Ok(ProviderKind::Remote),
            other => Err(anyhow::anyhow!(
                "Unknown AI_PROVIDER '{other}' (expected 'local' or 'remote')"
            )),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Local => write!(f, "local"),
            ProviderKind::Remote => write!(f, "remote"),
        }
    }
}

/// Capability requirement of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Text,
    Json,
}

/// One backend model variant in the configured fallback order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub position: usize,
    /// Whether the model accepts the provider's structured (JSON) output mode.
    pub supports_json: bool,
}

impl ModelDescriptor {
    /// Builds the ordered descriptor list from plain names.
    pub fn list_from_names<S: AsRef<str>>(
        names: &[S],
        supports_json: impl Fn(&str) -> bool,
    ) -> Vec<ModelDescriptor> {
        names
            .iter()
            .enumerate()
            .map(|(position, name)| ModelDescriptor {
                name: name.as_ref().to_string(),
                position,
                supports_json: supports_json(name.as_ref()),
            })
            .collect()
    }
}

/// Classified failure of a single provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("model not found: {0}")]
    NotFound(String),

    #[error("capability unsupported: {0}")]
    Unsupported(String),

    /// The request itself was refused (e.g. prompt too long); no model will accept it.
    #[error("request rejected: {0}")]
    BadRequest(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

/// A text-generation transport. Implementations issue exactly one request per `call`.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model names used when the configuration does not list any.
    fn default_models(&self) -> Vec<String>;

    /// Whether the named model supports `ResponseMode::Json`.
    fn supports_json(&self, _model: &str) -> bool {
        true
    }

    async fn call(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        mode: ResponseMode,
    ) -> Result<String, ProviderError>;

    async fn check_availability(&self) -> bool;
}

/// Maps transport-level reqwest failures. Timeouts and connection resets are worth retrying.
pub(crate) fn classify_transport_error(err: &reqwest::Error) -> ProviderError {
    ProviderError::Transient(err.to_string())
}
