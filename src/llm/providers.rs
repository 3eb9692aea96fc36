use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use super::{BackendError, GenerativeBackend, Role, Turn};
use crate::config::LlmConfig;

const MAX_ERROR_BODY: usize = 500;

/// Send a JSON request and return the decoded body, mapping every failure
/// shape (transport, HTTP status, provider error object) to a `BackendError`.
async fn post_json(provider: &str, request: RequestBuilder) -> Result<Value, BackendError> {
    let resp = request.send().await.map_err(|source| BackendError::Transport {
        provider: provider.to_string(),
        source,
    })?;

    let status = resp.status();
    let text = resp.text().await.map_err(|source| BackendError::Transport {
        provider: provider.to_string(),
        source,
    })?;

    if !status.is_success() {
        let body: String = text.chars().take(MAX_ERROR_BODY).collect();
        return Err(BackendError::Upstream {
            provider: provider.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let json: Value = serde_json::from_str(&text).map_err(|source| BackendError::Malformed {
        provider: provider.to_string(),
        source,
    })?;

    if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(BackendError::Provider {
            provider: provider.to_string(),
            message,
        });
    }
    Ok(json)
}

fn non_empty(provider: &str, text: String) -> Result<String, BackendError> {
    if text.trim().is_empty() {
        Err(BackendError::EmptyResponse {
            provider: provider.to_string(),
        })
    } else {
        Ok(text)
    }
}

// ── OpenAI-compatible chat completions ───────────────────────────────────────

pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(client: Client, config: &LlmConfig, api_key: String) -> Self {
        Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
        }
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, system: &str, turns: &[Turn], temperature: f32) -> Result<String, BackendError> {
        let mut messages = vec![json!({"role": "system", "content": system})];
        messages.extend(
            turns
                .iter()
                .map(|t| json!({"role": t.role.as_str(), "content": t.content})),
        );
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": self.max_tokens,
        });

        let request = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let json = post_json(self.name(), request).await?;

        // choices[0].message.content may be null
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string();
        non_empty(self.name(), content)
    }
}

// ── Anthropic messages API ───────────────────────────────────────────────────

pub struct AnthropicBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(client: Client, config: &LlmConfig, api_key: String) -> Self {
        Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl GenerativeBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, system: &str, turns: &[Turn], temperature: f32) -> Result<String, BackendError> {
        let messages: Vec<Value> = turns
            .iter()
            .map(|t| json!({"role": t.role.as_str(), "content": t.content}))
            .collect();
        let body = json!({
            "model": self.model,
            "system": system,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": self.max_tokens,
        });

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body);
        let json = post_json(self.name(), request).await?;

        let content: String = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        non_empty(self.name(), content)
    }
}

// ── Google Gemini generateContent ────────────────────────────────────────────

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl GeminiBackend {
    pub fn new(client: Client, config: &LlmConfig, api_key: String) -> Self {
        Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, system: &str, turns: &[Turn], temperature: f32) -> Result<String, BackendError> {
        let contents: Vec<Value> = turns
            .iter()
            .map(|t| {
                let role = match t.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": t.content}]})
            })
            .collect();
        let body = json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": contents,
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": self.max_tokens,
            },
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let json = post_json(self.name(), request).await?;

        let content: String = json["candidates"]
            .get(0)
            .and_then(|c| c["content"]["parts"].as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        non_empty(self.name(), content)
    }
}

// ── No credential ────────────────────────────────────────────────────────────

/// Stands in for a provider whose key is missing; every call reports the
/// configuration problem instead of reaching the network.
pub struct UnconfiguredBackend {
    provider: String,
}

impl UnconfiguredBackend {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
        }
    }
}

#[async_trait]
impl GenerativeBackend for UnconfiguredBackend {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn complete(&self, _system: &str, _turns: &[Turn], _temperature: f32) -> Result<String, BackendError> {
        Err(BackendError::MissingCredential {
            provider: self.provider.clone(),
        })
    }
}
