use anyhow::{bail, Context, Result};

use crate::interview::fallback::DEFAULT_QUESTION_COUNT;
use crate::llm_client::cascade::DEFAULT_MAX_RETRIES;
use crate::llm_client::provider::ProviderKind;
use crate::llm_client::rate_limiter::DEFAULT_MAX_PER_WINDOW;

const DEFAULT_OLLAMA_API_URL: &str = "http://localhost:11434";
const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Application configuration loaded from environment variables.
/// Read once at startup; invalid values abort the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub ai_provider: ProviderKind,
    /// Ordered model names for the selected provider. Empty means "use the provider default".
    pub ai_models: Vec<String>,
    pub rate_limit_per_minute: usize,
    pub max_retries: u32,
    pub remember_last_model: bool,
    pub request_timeout_secs: u64,
    pub ollama_api_url: String,
    pub gemini_api_url: String,
    pub gemini_api_key: Option<String>,
    pub question_count: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let ai_provider = match var("AI_PROVIDER") {
            Some(raw) => raw.parse::<ProviderKind>()?,
            None => ProviderKind::Local,
        };

        let ai_models = var("AI_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let rate_limit_per_minute: usize =
            parse_or(&var, "AI_RATE_LIMIT_PER_MINUTE", DEFAULT_MAX_PER_WINDOW)?;
        if rate_limit_per_minute == 0 {
            bail!("AI_RATE_LIMIT_PER_MINUTE must be greater than zero");
        }

        let max_retries: u32 = parse_or(&var, "AI_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        if max_retries == 0 {
            bail!("AI_MAX_RETRIES must be greater than zero");
        }

        Ok(Config {
            ai_provider,
            ai_models,
            rate_limit_per_minute,
            max_retries,
            remember_last_model: parse_or(&var, "AI_REMEMBER_LAST_MODEL", true)?,
            request_timeout_secs: parse_or(&var, "AI_REQUEST_TIMEOUT_SECS", 120)?,
            ollama_api_url: var("OLLAMA_API_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_API_URL.to_string()),
            gemini_api_url: var("GEMINI_API_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_API_URL.to_string()),
            gemini_api_key: var("GEMINI_API_KEY").filter(|key| !key.trim().is_empty()),
            question_count: parse_or(
                &var,
                "INTERVIEW_QUESTION_COUNT",
                DEFAULT_QUESTION_COUNT,
            )?,
            port: parse_or(&var, "PORT", 8080)?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}
