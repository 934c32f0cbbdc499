//! Generator for OpenAI-compatible chat-completions endpoints.

use super::cli::tail;
use super::{GenerationRequest, Generator, Role};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const BODY_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.8
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

pub struct OpenAiAgent {
    name: String,
    config: OpenAiConfig,
}

impl OpenAiAgent {
    pub fn new(name: &str, config: OpenAiConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

/// Request body for a chat-completions call.
pub(crate) fn request_body(config: &OpenAiConfig, request: &GenerationRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system_prompt.trim().is_empty() {
        messages.push(json!({"role": "system", "content": request.system_prompt}));
    }
    for message in &request.messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(json!({"role": role, "content": message.content}));
    }
    json!({
        "model": config.model,
        "temperature": config.temperature,
        "messages": messages,
    })
}

/// Extracts the first choice's message text.
pub(crate) fn parse_completion(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body).context("Completion response is not JSON")?;
    let content = value["choices"][0]["message"]["content"]
        .as_str()
        .context("Completion response has no message content")?;
    Ok(content.trim().to_string())
}

fn call_endpoint(url: &str, api_key: &str, body: String, timeout: Duration) -> Result<String> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into();

    let mut response = agent
        .post(url)
        .header("Authorization", &format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .send(body)
        .with_context(|| format!("Failed to reach {}", url))?;
    let status = response.status();
    let text = response
        .body_mut()
        .read_to_string()
        .context("Failed to read completion response")?;

    if !status.is_success() {
        bail!(
            "Completion request failed with {}: {}",
            status,
            tail(&text, BODY_EXCERPT_CHARS)
        );
    }
    Ok(text)
}

#[async_trait]
impl Generator for OpenAiAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let api_key = std::env::var(&self.config.api_key_env).with_context(|| {
            format!(
                "Agent '{}': environment variable {} is not set",
                self.name, self.config.api_key_env
            )
        })?;
        let body = request_body(&self.config, &request).to_string();
        let url = self.endpoint();
        let timeout = Duration::from_secs(self.config.timeout_secs);

        tracing::debug!(agent = %self.name, url = %url, "Requesting completion");
        let text = tokio::task::spawn_blocking(move || call_endpoint(&url, &api_key, body, timeout))
            .await
            .context("Completion task panicked")??;
        parse_completion(&text)
    }
}
