//! Ollama LLM Provider
//!
//! Local inference through Ollama's OpenAI-compatible `/v1` surface. No API
//! key is needed; the endpoint comes from the credentials or falls back to
//! the default local daemon.

use agent_core::{
    LlmConfig,
    error::Result,
    message::CompletionRequest,
    provider::ProviderKind,
    tool::ToolOutput,
};
use reqwest::header::HeaderMap;

use crate::engine::{Decoded, WireCodec};
use crate::openai::{
    ChatMessage, ChatRequest, ChatResponse, chat_api_error, decode_chat, encode_chat,
    push_chat_round,
};

/// Default local Ollama endpoint
pub const OLLAMA_DEFAULT_ENDPOINT: &str = "http://localhost:11434/v1";

/// Chat-completions codec pointed at an Ollama daemon
#[derive(Clone, Copy, Debug, Default)]
pub struct OllamaCodec;

impl WireCodec for OllamaCodec {
    type Request = ChatRequest;
    type Response = ChatResponse;
    type Turn = ChatMessage;

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn endpoint(&self, config: &LlmConfig) -> Result<String> {
        let base = config
            .base_url
            .as_deref()
            .or_else(|| config.credentials.endpoint())
            .unwrap_or(OLLAMA_DEFAULT_ENDPOINT);
        Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
    }

    fn headers(&self, _config: &LlmConfig) -> Result<HeaderMap> {
        Ok(HeaderMap::new())
    }

    fn encode(&self, request: &CompletionRequest) -> ChatRequest {
        encode_chat(request)
    }

    fn decode(&self, response: ChatResponse) -> Result<Decoded<ChatMessage>> {
        decode_chat(response)
    }

    fn push_tool_round(&self, request: &mut ChatRequest, turn: ChatMessage, outputs: Vec<ToolOutput>) {
        push_chat_round(request, turn, outputs);
    }

    fn api_error(&self, body: &[u8]) -> Option<String> {
        chat_api_error(body)
    }
}
