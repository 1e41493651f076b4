//! Generation backends.
//!
//! A backend turns a prompt into text. Backends are slow and unreliable;
//! callers always go through [`invoke_with_deadline`], which enforces the
//! hard timeout. Cancellation is by dropping the future, so implementations
//! must release their process or connection on drop.

mod cli;
mod http;

pub use cli::CliBackend;
pub use http::GeminiBackend;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Errors from a generation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to start backend: {0}")]
    Spawn(String),

    #[error("Backend exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Backend returned no text")]
    EmptyOutput,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Backend refused: {0}")]
    Refused(String),
}

/// A prompt plus optional directives.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            temperature: None,
            max_output_tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }
}

/// Something that turns a prompt into text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Run a backend call under a hard deadline.
///
/// On expiry the in-flight call is dropped, which terminates it.
pub async fn invoke_with_deadline(
    backend: &dyn GenerationBackend,
    request: GenerationRequest,
    deadline: Duration,
) -> Result<String, BackendError> {
    let started = Instant::now();
    let result = match tokio::time::timeout(deadline, backend.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(deadline)),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(text) => debug!(
            backend = backend.name(),
            elapsed_ms,
            chars = text.chars().count(),
            "Backend call succeeded"
        ),
        Err(e) => warn!(backend = backend.name(), elapsed_ms, error = %e, "Backend call failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedBackend, ScriptedReply};

    #[tokio::test]
    async fn test_invoke_passes_result_through() {
        let backend = ScriptedBackend::new([ScriptedReply::text("嗨")]);
        let out = invoke_with_deadline(
            &backend,
            GenerationRequest::new("p"),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(out, "嗨");
        assert_eq!(backend.prompts(), vec!["p".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let backend = ScriptedBackend::new([ScriptedReply::Hang]);
        let err = invoke_with_deadline(
            &backend,
            GenerationRequest::new("p"),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[test]
    fn test_request_builder() {
        let req = GenerationRequest::new("p")
            .with_model("m")
            .with_temperature(0.3)
            .with_max_output_tokens(64);
        assert_eq!(req.model.as_deref(), Some("m"));
        assert_eq!(req.temperature, Some(0.3));
        assert_eq!(req.max_output_tokens, Some(64));
    }
}
