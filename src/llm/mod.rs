pub mod providers;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{LlmConfig, Provider};
pub use providers::{AnthropicBackend, GeminiBackend, OpenAiBackend, UnconfiguredBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One prior message in a conversation with the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("No API key configured for the {provider} backend. Set LLM_API_KEY (or the provider-specific key) to enable answers.")]
    MissingCredential { provider: String },
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned HTTP {status}: {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} reported an error: {message}")]
    Provider { provider: String, message: String },
    #[error("{provider} returned no response text")]
    EmptyResponse { provider: String },
    #[error("{provider} returned malformed JSON: {source}")]
    Malformed {
        provider: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BackendError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, BackendError::MissingCredential { .. })
    }
}

/// Text-in, text-out capability of a large-language-model provider.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        system: &str,
        turns: &[Turn],
        temperature: f32,
    ) -> Result<String, BackendError>;
}

/// Pick the provider implementation for `config`. Without a key the
/// unconfigured backend is returned so the service still starts.
pub fn backend_from_config(config: &LlmConfig) -> anyhow::Result<Arc<dyn GenerativeBackend>> {
    let Some(api_key) = config.api_key.clone().filter(|k| !k.trim().is_empty()) else {
        tracing::warn!("No API key for provider {}, answers will explain the missing credential", config.provider);
        return Ok(Arc::new(UnconfiguredBackend::new(config.provider.as_str())));
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()?;

    let backend: Arc<dyn GenerativeBackend> = match config.provider {
        Provider::OpenAi => Arc::new(OpenAiBackend::new(client, config, api_key)),
        Provider::Anthropic => Arc::new(AnthropicBackend::new(client, config, api_key)),
        Provider::Gemini => Arc::new(GeminiBackend::new(client, config, api_key)),
    };
    tracing::info!(provider = backend.name(), model = %config.model, "Generative backend initialized");
    Ok(backend)
}
