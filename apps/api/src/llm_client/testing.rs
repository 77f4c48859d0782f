//! Scripted provider for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm_client::cascade::ModelFallbackCascade;
use crate::llm_client::provider::{
    ModelDescriptor, Provider, ProviderError, ProviderKind, ResponseMode,
};
use crate::llm_client::rate_limiter::RateLimiter;
use crate::llm_client::LlmClient;

type Script = dyn Fn(&str, ResponseMode, u32) -> Result<String, ProviderError> + Send + Sync;

/// Answers each call from a script `(model, mode, prior calls to model) -> result`
/// and records every call it receives.
pub(crate) struct ScriptedProvider {
    script: Box<Script>,
    calls: Mutex<Vec<(String, ResponseMode)>>,
    available: bool,
}

impl ScriptedProvider {
    pub(crate) fn new(
        script: impl Fn(&str, ResponseMode, u32) -> Result<String, ProviderError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            available: true,
        }
    }

    /// A provider whose every call fails with a transient error.
    pub(crate) fn down() -> Self {
        let mut provider =
            Self::new(|_, _, _| Err(ProviderError::Transient("connection refused".into())));
        provider.available = false;
        provider
    }

    pub(crate) fn calls(&self) -> Vec<(String, ResponseMode)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, model: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == model)
            .count()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn default_models(&self) -> Vec<String> {
        vec!["scripted".to_string()]
    }

    async fn call(
        &self,
        model: &ModelDescriptor,
        _prompt: &str,
        mode: ResponseMode,
    ) -> Result<String, ProviderError> {
        let prior = self.calls_to(&model.name) as u32;
        self.calls.lock().unwrap().push((model.name.clone(), mode));
        (self.script)(&model.name, mode, prior)
    }

    async fn check_availability(&self) -> bool {
        self.available
    }
}

/// Client over `provider` with JSON-capable `models`, 3 retries and the default quota.
pub(crate) fn scripted_client(provider: Arc<ScriptedProvider>, models: &[&str]) -> LlmClient {
    let cascade = ModelFallbackCascade::new(
        ModelDescriptor::list_from_names(models, |_| true),
        3,
        Arc::new(RateLimiter::default()),
    );
    LlmClient::new(provider, cascade)
}
