//! # agent-runtime
//!
//! Runtime providers for the agent toolkit.
//!
//! ## Providers
//!
//! - **OpenAI** and **Azure OpenAI**: chat completions
//! - **Anthropic**: Messages API
//! - **Gemini**: `generateContent`
//! - **Ollama**: local daemon through its OpenAI-compatible surface
//!
//! Every backend is a [`CompletionEngine`] parameterized by a wire codec, so
//! the tool-calling loop, retries and response limits behave identically.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::new_llm_task;
//!
//! let config = LlmConfig::from_env()?;
//! let mut task = new_llm_task(&agent, &config)?;
//! task.with_user_prompt("Summarize the Rust ownership model".into());
//! let answer = task.completion(&CancellationToken::new(), &[]).await?;
//! ```

pub mod anthropic;
pub mod engine;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod retry;
pub mod transport;

#[cfg(test)]
mod testing;

pub use anthropic::AnthropicCodec;
pub use engine::{CompletionEngine, MAX_TOOL_ROUNDS, WireCodec};
pub use gemini::GeminiCodec;
pub use ollama::OllamaCodec;
pub use openai::OpenAiCodec;
pub use retry::{RETRYABLE_STATUS, RetryableError, with_retry};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentError, LlmConfig, LlmProvider, Pipeline, ProviderKind, Result, Tool, ToolRegistry,
};

/// Build a provider for `agent` from `config`.
///
/// Validates the persona, the configuration and the model catalog before
/// anything is constructed; credentials are checked on the first
/// `completion` call.
pub fn new_llm_task(agent: &Agent, config: &LlmConfig) -> Result<Box<dyn LlmProvider>> {
    agent.validate()?;
    config.validate()?;

    let kind = config
        .provider
        .ok_or_else(|| AgentError::InvalidConfig("provider is required".into()))?;
    kind.check_model(&config.model)?;

    tracing::info!(provider = %kind, model = %config.model, "creating LLM task");

    let agent_config = config.clone();
    let provider: Box<dyn LlmProvider> = match kind {
        ProviderKind::OpenAi => Box::new(CompletionEngine::new(OpenAiCodec::OpenAi, agent, agent_config)?),
        ProviderKind::Azure => Box::new(CompletionEngine::new(OpenAiCodec::Azure, agent, agent_config)?),
        ProviderKind::Anthropic => Box::new(CompletionEngine::new(AnthropicCodec, agent, agent_config)?),
        ProviderKind::Gemini => Box::new(CompletionEngine::new(GeminiCodec, agent, agent_config)?),
        ProviderKind::Ollama => Box::new(CompletionEngine::new(OllamaCodec, agent, agent_config)?),
    };
    Ok(provider)
}

/// Same as [`new_llm_task`], resolving the provider from its name first
pub fn new_llm_task_named(agent: &Agent, provider: &str, config: &LlmConfig) -> Result<Box<dyn LlmProvider>> {
    let kind: ProviderKind = provider.parse()?;
    new_llm_task(agent, &config.clone().with_provider(kind))
}
