//! Model configuration from the environment

use super::{LlmError, LlmService, LlmStream, LlmRequest, LoggingService, OpenAIService};
use async_trait::async_trait;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Model settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("ORCHESTRATOR_MODEL").unwrap_or(defaults.model),
            temperature: defaults.temperature,
        }
    }

    /// Build the logging-wrapped service
    ///
    /// Without an API key the server still runs; every model call then
    /// fails with an auth error that surfaces through the chat stream.
    pub fn build(&self) -> Result<Arc<dyn LlmService>, LlmError> {
        let inner: Arc<dyn LlmService> = match &self.api_key {
            Some(key) => Arc::new(OpenAIService::new(key.clone(), &self.base_url, &self.model)?),
            None => {
                tracing::warn!("OPENAI_API_KEY not set, model calls will fail");
                Arc::new(UnconfiguredService {
                    model_id: self.model.clone(),
                })
            }
        };
        Ok(Arc::new(LoggingService::new(inner)))
    }
}

struct UnconfiguredService {
    model_id: String,
}

#[async_trait]
impl LlmService for UnconfiguredService {
    async fn stream(&self, _request: &LlmRequest) -> Result<LlmStream, LlmError> {
        Err(LlmError::auth("No API key configured (set OPENAI_API_KEY)"))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;

    #[tokio::test]
    async fn test_unconfigured_service_reports_auth_error() {
        let service = LlmConfig::default().build().unwrap();
        assert_eq!(service.model_id(), DEFAULT_MODEL);

        let request = LlmRequest {
            system: String::new(),
            messages: vec![],
            tools: vec![],
            temperature: None,
        };
        let Err(err) = service.stream(&request).await else {
            panic!("expected an error");
        };
        assert_eq!(err.kind, LlmErrorKind::Auth);
    }

    #[test]
    fn test_configured_service_keeps_model_id() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            model: "gpt-4o".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(config.build().unwrap().model_id(), "gpt-4o");
    }
}
