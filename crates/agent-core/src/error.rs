//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Boxed error returned by tool executables
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Provider name is not one of the supported backends
    #[error("provider does not exist: {0:?}")]
    ProviderNotFound(String),

    /// Model is not in the provider's catalog
    #[error("model does not exist for the selected provider: {0}")]
    ModelNotFound(String),

    #[error("agent role is required (use with_role())")]
    MissingRole,

    #[error("agent backstory is required (use with_backstory())")]
    MissingBackstory,

    #[error("agent goal is required (use with_goal())")]
    MissingGoal,

    /// `completion` was called before `with_user_prompt`
    #[error("user prompt is required (use with_user_prompt())")]
    MissingPrompt,

    #[error("API key not provided: {0}")]
    MissingApiKey(String),

    #[error("endpoint not provided: {0}")]
    MissingEndpoint(String),

    /// More than one context argument passed to `completion`
    #[error("too many arguments: only one optional context argument is allowed")]
    TooManyArgs,

    /// Transport or codec failure, message carries the failing phase
    #[error("completion request failed: {0}")]
    CompletionFailed(String),

    /// Unknown tool or tool execution failure
    #[error("tool call execution failed: tool {tool:?}: {source}")]
    ToolCallFailed {
        tool: String,
        #[source]
        source: BoxError,
    },

    /// The model kept requesting tools past the round cap
    #[error("maximum tool call rounds exceeded: {0} rounds")]
    MaxToolRoundsExceeded(usize),

    #[error("invalid LLM configuration: {0}")]
    InvalidConfig(String),

    #[error("response body exceeds maximum allowed size of {0} bytes")]
    ResponseTooLarge(usize),

    /// Cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// A chain stage failed (1-based stage index)
    #[error("chain interrupted by task error: task {task} failed: {source}")]
    ChainInterrupted {
        task: usize,
        #[source]
        source: Box<AgentError>,
    },

    /// A pipeline task failed or panicked (1-based task index)
    #[error("task {task}: {source}")]
    TaskFailed {
        task: usize,
        #[source]
        source: Box<AgentError>,
    },

    /// A pipeline task panicked instead of returning an error
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Several concurrent tasks failed
    #[error("{}", join_errors(.0))]
    Multiple(Vec<AgentError>),

    /// A pipeline run that failed part-way. `results` keeps submission
    /// order with `None` where a task failed or never ran.
    #[error("{source}")]
    Partial {
        results: Vec<Option<String>>,
        #[source]
        source: Box<AgentError>,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_errors(errors: &[AgentError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AgentError {
    /// Build a `CompletionFailed` tagged with the phase that failed
    pub fn completion(phase: &str, detail: impl std::fmt::Display) -> Self {
        AgentError::CompletionFailed(format!("{phase}: {detail}"))
    }

    /// Build a `ToolCallFailed` for `tool`
    pub fn tool_failed(tool: impl Into<String>, source: impl Into<BoxError>) -> Self {
        AgentError::ToolCallFailed {
            tool: tool.into(),
            source: source.into(),
        }
    }

    /// Outputs of the tasks that succeeded before a pipeline failure
    pub fn partial_results(&self) -> Option<&[Option<String>]> {
        match self {
            AgentError::Partial { results, .. } => Some(results.as_slice()),
            _ => None,
        }
    }

    /// Errors raised before any network call is made
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            AgentError::MissingPrompt
                | AgentError::TooManyArgs
                | AgentError::MissingApiKey(_)
                | AgentError::MissingEndpoint(_)
                | AgentError::MissingRole
                | AgentError::MissingBackstory
                | AgentError::MissingGoal
                | AgentError::InvalidConfig(_)
                | AgentError::ProviderNotFound(_)
                | AgentError::ModelNotFound(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::MissingApiKey(provider) => {
                format!("No API key configured for {provider}. Set it in your environment or .env file.")
            }
            AgentError::MissingEndpoint(provider) => {
                format!("No endpoint configured for {provider}.")
            }
            AgentError::ToolCallFailed { tool, .. } => format!("The tool '{tool}' failed."),
            AgentError::MaxToolRoundsExceeded(_) => {
                "The model kept calling tools without answering. Please try a simpler query.".into()
            }
            AgentError::ResponseTooLarge(_) => "The AI service returned an oversized response.".into(),
            AgentError::Cancelled => "The request was cancelled.".into(),
            AgentError::ChainInterrupted { source, .. }
            | AgentError::TaskFailed { source, .. }
            | AgentError::Partial { source, .. } => source.user_message(),
            err if err.is_usage_error() => err.to_string(),
            _ => "The AI service encountered an error. Please try again.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_carries_phase() {
        let err = AgentError::completion("unmarshal", "expected value");
        assert_eq!(
            err.to_string(),
            "completion request failed: unmarshal: expected value"
        );
    }

    #[test]
    fn test_tool_failed_keeps_source() {
        let err = AgentError::tool_failed("get_weather", "upstream down");
        assert!(err.to_string().contains("get_weather"));
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string),
            Some("upstream down".to_string())
        );
    }

    #[test]
    fn test_usage_errors() {
        assert!(AgentError::MissingPrompt.is_usage_error());
        assert!(AgentError::TooManyArgs.is_usage_error());
        assert!(!AgentError::Cancelled.is_usage_error());
        assert!(!AgentError::MaxToolRoundsExceeded(10).is_usage_error());
    }

    #[test]
    fn test_multiple_joins_messages() {
        let err = AgentError::Multiple(vec![
            AgentError::TaskFailed { task: 1, source: Box::new(AgentError::Cancelled) },
            AgentError::TaskFailed { task: 3, source: Box::new(AgentError::MissingPrompt) },
        ]);
        let text = err.to_string();
        assert!(text.starts_with("task 1: operation cancelled; task 3: "));
    }

    #[test]
    fn test_partial_displays_source() {
        let err = AgentError::Partial {
            results: vec![Some("first".into()), None],
            source: Box::new(AgentError::TaskFailed { task: 2, source: Box::new(AgentError::Cancelled) }),
        };
        assert_eq!(err.to_string(), "task 2: operation cancelled");
        assert_eq!(err.user_message(), "The request was cancelled.");
        assert_eq!(err.partial_results().unwrap()[0].as_deref(), Some("first"));
        assert!(AgentError::Cancelled.partial_results().is_none());
    }
}
