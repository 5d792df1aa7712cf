//! # agent-core
//!
//! Provider-agnostic building blocks for LLM agents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Pipeline                             │
//! │   chain / fan-out over tasks (each task = one completion)    │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────┐  ┌────────────▼────────────┐  ┌──────────────┐
//! │ Agent        │──│   LlmProvider           │──│ ToolRegistry │
//! │ (persona)    │  │   (Strategy, per        │  │ built-in +   │
//! │ LlmConfig    │  │    backend in runtime)  │  │ custom tools │
//! └──────────────┘  └─────────────────────────┘  └──────────────┘
//! ```
//!
//! Concrete backends (OpenAI, Azure OpenAI, Anthropic, Gemini, Ollama)
//! live in `agent-runtime`; this crate only defines what they consume and
//! expose.

pub mod agent;
pub mod config;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod provider;
pub mod tool;

pub use agent::Agent;
pub use config::{Credentials, LlmConfig};
pub use error::{AgentError, BoxError, Result};
pub use message::{CompletionRequest, PromptMessage, Role};
pub use pipeline::{Pipeline, TaskFn};
pub use provider::{LlmProvider, ProviderKind};
pub use tool::{FunctionShape, Tool, ToolCall, ToolDeclaration, ToolFn, ToolOutput, ToolRegistry, ToolResult};
