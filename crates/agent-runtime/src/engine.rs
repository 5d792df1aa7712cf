//! Completion Engine
//!
//! Runs the tool-calling loop shared by every backend. A [`WireCodec`]
//! translates the abstract [`CompletionRequest`] into a provider's JSON
//! body and normalizes the reply; the engine owns the transport, the tool
//! registry and the round counter.
//!
//! ```text
//! resolve prompt ─► encode ─► POST ─► decode ─┬─ text only ─► return
//!                                ▲            │
//!                                │            └─ tool calls ─► execute
//!                                └──── push_tool_round ◄──────────┘
//! ```

use std::sync::Arc;

use agent_core::{
    Agent, LlmConfig,
    error::{AgentError, Result},
    message::{CompletionRequest, PromptMessage, resolve_user_prompt},
    provider::{LlmProvider, ProviderKind},
    tool::{FunctionShape, Tool, ToolCall, ToolDeclaration, ToolFn, ToolOutput, ToolRegistry},
};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::transport::HttpTransport;

/// Tool rounds allowed per completion before giving up
pub const MAX_TOOL_ROUNDS: usize = 10;

/// A provider reply reduced to what the loop needs
#[derive(Debug)]
pub struct Decoded<T> {
    /// Concatenated text content
    pub text: String,

    /// Requested tool calls, arguments as JSON text
    pub tool_calls: Vec<ToolCall>,

    /// Assistant turn, echoed back verbatim on the next round
    pub turn: T,
}

/// Translation between the abstract request and one provider's wire format
pub trait WireCodec: Send + Sync + 'static {
    type Request: Serialize + Send + Sync;
    type Response: DeserializeOwned + Send;
    type Turn: Send;

    fn kind(&self) -> ProviderKind;

    /// Full request URL; fails when a required endpoint is missing
    fn endpoint(&self, config: &LlmConfig) -> Result<String>;

    /// Authentication and versioning headers; fails when the key is missing
    fn headers(&self, config: &LlmConfig) -> Result<HeaderMap>;

    fn encode(&self, request: &CompletionRequest) -> Self::Request;

    fn decode(&self, response: Self::Response) -> Result<Decoded<Self::Turn>>;

    /// Append the assistant turn followed by the tool results
    fn push_tool_round(&self, request: &mut Self::Request, turn: Self::Turn, outputs: Vec<ToolOutput>);

    /// Readable message from an error body, if the provider has a format for it
    fn api_error(&self, _body: &[u8]) -> Option<String> {
        None
    }
}

/// [`LlmProvider`] backed by a [`WireCodec`]
pub struct CompletionEngine<C: WireCodec> {
    codec: C,
    config: LlmConfig,
    system: Vec<PromptMessage>,
    user_prompt: Option<String>,
    tools: ToolRegistry,
    transport: HttpTransport,
    max_tool_rounds: usize,
}

impl<C: WireCodec> CompletionEngine<C> {
    pub fn new(codec: C, agent: &Agent, config: LlmConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.timeout, config.max_retries)?;

        tracing::debug!(
            provider = %codec.kind(),
            model = %config.model,
            "completion engine ready"
        );

        Ok(Self {
            codec,
            system: agent.system_prompts(),
            config,
            user_prompt: None,
            tools: ToolRegistry::new(),
            transport,
            max_tool_rounds: MAX_TOOL_ROUNDS,
        })
    }

    /// Override the tool round cap
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn build_request(&self, user: String) -> CompletionRequest {
        CompletionRequest {
            system: self.system.clone(),
            user,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools: self.tools.declarations().to_vec(),
        }
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        url: &str,
        headers: &HeaderMap,
        request: &C::Request,
    ) -> Result<Decoded<C::Turn>> {
        let api_error = |body: &[u8]| self.codec.api_error(body);
        let response: C::Response = self
            .transport
            .post_json(cancel, url, headers, request, &api_error)
            .await?;

        let decoded = self.codec.decode(response)?;
        if decoded.text.is_empty() && decoded.tool_calls.is_empty() {
            return Err(AgentError::completion(
                "decode",
                "response carried neither text nor tool calls",
            ));
        }
        Ok(decoded)
    }

    async fn execute_calls(&self, cancel: &CancellationToken, calls: &[ToolCall]) -> Result<Vec<ToolOutput>> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            tracing::debug!(tool = %call.name, id = %call.id, "executing tool call");
            outputs.push(self.tools.execute(cancel, call).await?);
            if cancel.is_cancelled() {
                tracing::debug!(tool = %call.name, "cancelled during tool round");
                return Err(AgentError::Cancelled);
            }
        }
        Ok(outputs)
    }
}

#[async_trait]
impl<C: WireCodec> LlmProvider for CompletionEngine<C> {
    fn kind(&self) -> ProviderKind {
        self.codec.kind()
    }

    fn with_user_prompt(&mut self, prompt: String) {
        self.user_prompt = Some(prompt);
    }

    fn with_tools(&mut self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            self.tools.register_builtin(tool);
        }
    }

    fn add_custom_tools(&mut self, name: &str, description: &str, shape: FunctionShape, function: ToolFn) {
        self.tools.register_custom(name, description, &shape, function);
    }

    fn declared_tools(&self) -> &[ToolDeclaration] {
        self.tools.declarations()
    }

    async fn completion(&self, cancel: &CancellationToken, context: &[&str]) -> Result<String> {
        let user = resolve_user_prompt(self.user_prompt.as_deref(), context)?;
        let url = self.codec.endpoint(&self.config)?;
        let headers = self.codec.headers(&self.config)?;

        let mut request = self.codec.encode(&self.build_request(user));
        let mut reply = self.send(cancel, &url, &headers, &request).await?;
        let mut round = 0;

        loop {
            if reply.tool_calls.is_empty() {
                return Ok(reply.text);
            }
            if round >= self.max_tool_rounds {
                tracing::warn!(provider = %self.kind(), rounds = round, "tool round cap reached");
                return Err(AgentError::MaxToolRoundsExceeded(self.max_tool_rounds));
            }
            round += 1;

            let outputs = self.execute_calls(cancel, &reply.tool_calls).await?;
            self.codec.push_tool_round(&mut request, reply.turn, outputs);

            reply = self
                .send(cancel, &url, &headers, &request)
                .await
                .map_err(|err| match err {
                    AgentError::CompletionFailed(detail) => {
                        AgentError::completion(&format!("follow-up round {round}"), detail)
                    }
                    other => other,
                })?;
        }
    }
}
