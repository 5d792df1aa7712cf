//! LLM Provider Strategy Pattern
//!
//! Defines the capability every backend exposes (OpenAI, Azure OpenAI,
//! Anthropic, Gemini, Ollama) so pipelines can drive any of them without
//! knowing their wire format.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::LlmProvider;
//!
//! let mut task = agent_runtime::new_llm_task(&agent, &config)?;
//! task.with_user_prompt("Who was Ada Lovelace?".into());
//! let answer = task.completion(&cancel, &[]).await?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::tool::{FunctionShape, Tool, ToolDeclaration, ToolFn};

/// Supported LLM backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai-azure")]
    Azure,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

const OPENAI_MODELS: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-4",
    "gpt-4o",
    "gpt-4-turbo",
    "gpt-4o-mini",
    "o1-mini",
    "o1",
    "gpt-5",
];

const ANTHROPIC_MODELS: &[&str] = &[
    "claude-3-haiku-20240307",
    "claude-3-5-sonnet-latest",
    "claude-3-7-sonnet-latest",
    "claude-sonnet-4-20250514",
    "claude-opus-4-20250514",
];

const GEMINI_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-2.0-flash-exp",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
];

// Suggestions only, Ollama serves whatever has been pulled locally
const OLLAMA_MODELS: &[&str] = &["llama3", "llama3.1", "mistral", "mixtral", "phi3", "gemma2"];

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAi,
        ProviderKind::Azure,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::Ollama,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Azure => "openai-azure",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Known models for this provider
    pub fn models(self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi | ProviderKind::Azure => OPENAI_MODELS,
            ProviderKind::Anthropic => ANTHROPIC_MODELS,
            ProviderKind::Gemini => GEMINI_MODELS,
            ProviderKind::Ollama => OLLAMA_MODELS,
        }
    }

    /// Validate `model` against the catalog. Ollama accepts any name.
    pub fn check_model(self, model: &str) -> Result<()> {
        if self == ProviderKind::Ollama || self.models().contains(&model) {
            return Ok(());
        }
        Err(AgentError::ModelNotFound(format!(
            "model {model:?} does not exist. Available models for {self}: {:?}",
            self.models()
        )))
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AgentError::ProviderNotFound(s.to_string()))
    }
}

/// Strategy trait for LLM providers
///
/// One instance is bound to an agent persona and a configuration. It holds a
/// pending user prompt and a tool registry; each `completion` call is an
/// independent exchange that may span several tool-call rounds.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Backend this instance talks to
    fn kind(&self) -> ProviderKind;

    /// Set the prompt used by subsequent `completion` calls
    fn with_user_prompt(&mut self, prompt: String);

    /// Register built-in tools (single `input` string parameter)
    fn with_tools(&mut self, tools: Vec<Arc<dyn Tool>>);

    /// Register a custom tool with an explicit parameter shape
    fn add_custom_tools(
        &mut self,
        name: &str,
        description: &str,
        shape: FunctionShape,
        function: ToolFn,
    );

    /// Declarations advertised to the model, in registration order
    fn declared_tools(&self) -> &[ToolDeclaration];

    /// Run one completion. `context` holds at most one prior-stage result.
    async fn completion(&self, cancel: &CancellationToken, context: &[&str]) -> Result<String>;
}
