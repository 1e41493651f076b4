//! Backend that calls the Gemini HTTP API directly.

use super::{BackendError, GenerationBackend, GenerationRequest};
use async_trait::async_trait;
use gemini::{FinishReason, Gemini};
use tracing::debug;

/// Generation over HTTP via the [`gemini`] client.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Gemini,
}

impl GeminiBackend {
    pub fn new(client: Gemini) -> Self {
        Self { client }
    }

    /// Build from GEMINI_API_KEY.
    pub fn from_env() -> Result<Self, BackendError> {
        Gemini::from_env().map(Self::new).map_err(map_error)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
        let mut api_request = gemini::Request::new(request.prompt);
        if let Some(model) = request.model {
            api_request = api_request.with_model(model);
        }
        if let Some(temperature) = request.temperature {
            api_request = api_request.with_temperature(temperature);
        }
        if let Some(tokens) = request.max_output_tokens {
            api_request = api_request.with_max_output_tokens(tokens);
        }

        let response = self.client.generate(api_request).await.map_err(map_error)?;

        if let Some(usage) = &response.usage {
            debug!(
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                output_tokens = usage.output_tokens,
                "Gemini usage"
            );
        }
        if response.finish_reason == FinishReason::Safety && response.text.trim().is_empty() {
            return Err(BackendError::Refused("safety filter".to_string()));
        }

        let text = response.text.trim();
        if text.is_empty() {
            return Err(BackendError::EmptyOutput);
        }
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        self.client.model()
    }
}

fn map_error(error: gemini::Error) -> BackendError {
    match error {
        gemini::Error::NoApiKey => BackendError::Refused("API key not configured".to_string()),
        gemini::Error::Config(msg) => BackendError::Refused(msg),
        gemini::Error::Blocked(msg) => BackendError::Refused(msg),
        gemini::Error::Network(msg) => BackendError::Transport(msg),
        gemini::Error::Parse(msg) => BackendError::Transport(format!("bad response: {msg}")),
        gemini::Error::Api { status, message } => BackendError::Api { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_error(gemini::Error::NoApiKey),
            BackendError::Refused(_)
        ));
        assert!(matches!(
            map_error(gemini::Error::Network("reset".into())),
            BackendError::Transport(m) if m == "reset"
        ));
        assert!(matches!(
            map_error(gemini::Error::Api {
                status: 429,
                message: "slow down".into()
            }),
            BackendError::Api { status: 429, .. }
        ));
        assert!(matches!(
            map_error(gemini::Error::Blocked("SAFETY".into())),
            BackendError::Refused(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let backend = GeminiBackend::new(Gemini::new("key").with_base_url("http://127.0.0.1:9"));
        let err = backend
            .generate(GenerationRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }
}
