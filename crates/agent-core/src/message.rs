//! Prompt Messages
//!
//! The provider-neutral request every codec translates into its wire format.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::tool::ToolDeclaration;

/// Separator between the user prompt and a prior-stage result
pub const CONTEXT_PREFIX: &str = "\n\nTake in consideration the following context: ";

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single role-tagged message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Abstract completion request, built once per `completion` call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Persona lines, in order
    pub system: Vec<PromptMessage>,

    /// Final user prompt (context already appended)
    pub user: String,

    pub model: String,

    pub temperature: f32,

    pub max_tokens: u32,

    pub tools: Vec<ToolDeclaration>,
}

impl CompletionRequest {
    /// System lines joined with newlines, for providers with a single system field
    pub fn system_text(&self) -> String {
        self.system
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Apply the prompt rules: a prompt must be set and at most one context
/// string may be appended.
pub fn resolve_user_prompt(prompt: Option<&str>, context: &[&str]) -> Result<String> {
    let prompt = prompt.ok_or(AgentError::MissingPrompt)?;

    match context {
        [] => Ok(prompt.to_string()),
        [extra] => Ok(format!("{prompt}{CONTEXT_PREFIX}{extra}")),
        _ => Err(AgentError::TooManyArgs),
    }
}
