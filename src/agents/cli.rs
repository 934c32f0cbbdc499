//! Generator backed by a command-line agent.
//!
//! The prepared prompt is written to the process's stdin and its stdout is
//! the generated text. The system prompt goes through the configured flag
//! when there is one, otherwise it is merged into the prompt.

use super::prompt::{prepare_prompt, PromptRequest, SystemPromptSupport};
use super::{GenerationRequest, Generator};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default overall timeout for a single generation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

const STDERR_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CliAgentConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Flag that takes the system prompt as its value, e.g. `--append-system-prompt`.
    #[serde(default)]
    pub system_prompt_flag: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

pub struct CliAgent {
    name: String,
    executable: PathBuf,
    config: CliAgentConfig,
    working_dir: PathBuf,
}

impl CliAgent {
    /// Resolves the configured command on `PATH`.
    pub fn new(name: &str, config: CliAgentConfig, working_dir: &Path) -> Result<Self> {
        let executable = which::which(&config.command).with_context(|| {
            format!(
                "Agent '{}': command '{}' not found on PATH",
                name, config.command
            )
        })?;
        Ok(Self {
            name: name.to_string(),
            executable,
            config,
            working_dir: working_dir.to_path_buf(),
        })
    }

    fn support(&self) -> SystemPromptSupport {
        if self.config.system_prompt_flag.is_some() {
            SystemPromptSupport::Separate
        } else {
            SystemPromptSupport::Merged
        }
    }
}

#[async_trait]
impl Generator for CliAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let prepared = prepare_prompt(PromptRequest::from(&request), self.support());

        let mut command = Command::new(&self.executable);
        command.args(&self.config.args);
        if let (Some(flag), Some(system)) =
            (&self.config.system_prompt_flag, &prepared.system_prompt_arg)
        {
            command.arg(flag).arg(system);
        }
        command
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(agent = %self.name, bytes = prepared.prompt.len(), "Spawning agent");
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {} process", self.name))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Failed to get stdin of agent process")?;
        let prompt = prepared.prompt;
        let writer = tokio::spawn(async move {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await
        });

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow!(
                    "{} invocation exceeded timeout of {:?}",
                    self.name,
                    timeout
                )
            })?
            .with_context(|| format!("Failed to collect output of {}", self.name))?;

        if let Ok(Err(e)) = writer.await {
            tracing::debug!(agent = %self.name, error = %e, "Agent closed stdin early");
        }

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.name,
                output.status,
                tail(&String::from_utf8_lossy(&output.stderr), STDERR_EXCERPT_CHARS)
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            bail!("{} produced no output", self.name);
        }
        Ok(text)
    }
}

/// Last `max` characters of `text`, trimmed.
pub(crate) fn tail(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    trimmed.chars().skip(count.saturating_sub(max)).collect()
}
