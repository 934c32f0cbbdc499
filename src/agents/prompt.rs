//! Prompt preparation for backends with and without system-prompt support.
//!
//! Backends that cannot take a separate system prompt get it merged into
//! the user prompt inside a `<system-context>` block so every backend sees
//! the same instructions.

use super::{GenerationRequest, Role};

/// Flattened prompt before backend-specific preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub user_prompt: String,
    pub system_prompt: Option<String>,
}

impl PromptRequest {
    pub fn new(user_prompt: String) -> Self {
        Self {
            user_prompt,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: String) -> Self {
        self.system_prompt = Some(system_prompt);
        self
    }
}

impl From<&GenerationRequest> for PromptRequest {
    /// Joins the conversation into one prompt, labelling earlier assistant turns.
    fn from(request: &GenerationRequest) -> Self {
        let user_prompt = request
            .messages
            .iter()
            .map(|m| match m.role {
                Role::User => m.content.clone(),
                Role::Assistant => format!("<previous-response>\n{}\n</previous-response>", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let system_prompt = Some(request.system_prompt.clone()).filter(|s| !s.trim().is_empty());
        Self {
            user_prompt,
            system_prompt,
        }
    }
}

/// Prompt ready for a specific backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPrompt {
    pub prompt: String,
    /// System prompt to pass through the backend's own flag, if it has one.
    pub system_prompt_arg: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPromptSupport {
    /// Backend accepts the system prompt separately.
    Separate,
    /// System prompt must be merged into the prompt text.
    Merged,
}

pub fn prepare_prompt(request: PromptRequest, support: SystemPromptSupport) -> PreparedPrompt {
    match support {
        SystemPromptSupport::Separate => PreparedPrompt {
            prompt: request.user_prompt,
            system_prompt_arg: request.system_prompt,
        },
        SystemPromptSupport::Merged => {
            let prompt = match request.system_prompt {
                Some(sys) => format!(
                    "<system-context>\n{}\n</system-context>\n\n{}",
                    sys, request.user_prompt
                ),
                None => request.user_prompt,
            };
            PreparedPrompt {
                prompt,
                system_prompt_arg: None,
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/prompt_tests.rs"]
mod tests;
