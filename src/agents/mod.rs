//! Text generation backends used by the stages.

mod cli;
mod openai;
mod prompt;

pub use cli::{CliAgent, CliAgentConfig};
pub use openai::{OpenAiAgent, OpenAiConfig};
pub use prompt::{prepare_prompt, PreparedPrompt, PromptRequest, SystemPromptSupport};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One generation call: a system prompt and the conversation so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
        }
    }
}

/// An external text generator. Failures are transient from the workflow's
/// point of view: the step halts and the thread can be resumed.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

/// Backend selection for a named agent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentConfig {
    Cli(CliAgentConfig),
    Openai(OpenAiConfig),
}

/// Builds the generator described by `config`.
pub fn build_generator(
    name: &str,
    config: &AgentConfig,
    working_dir: &Path,
) -> Result<Arc<dyn Generator>> {
    Ok(match config {
        AgentConfig::Cli(cli) => Arc::new(CliAgent::new(name, cli.clone(), working_dir)?),
        AgentConfig::Openai(api) => Arc::new(OpenAiAgent::new(name, api.clone())),
    })
}

#[cfg(test)]
#[path = "tests/agent_tests.rs"]
mod tests;
