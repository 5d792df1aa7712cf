//! Anthropic Messages API
//!
//! System lines go in the top-level `system` field. Tool calls arrive as
//! `tool_use` content blocks and results go back as `tool_result` blocks in
//! a user message.

use agent_core::{
    LlmConfig,
    error::{AgentError, Result},
    message::CompletionRequest,
    provider::ProviderKind,
    tool::{ParameterSchema, ToolCall, ToolOutput},
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::engine::{Decoded, WireCodec};
use crate::openai::header_value;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Block types this client does not act on
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: ParameterSchema,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    error: Option<AnthropicError>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicError,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}

impl std::fmt::Display for AnthropicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API error [{}]: {}", self.kind, self.message)
    }
}

/// Codec for `POST /v1/messages`
#[derive(Clone, Copy, Debug, Default)]
pub struct AnthropicCodec;

impl WireCodec for AnthropicCodec {
    type Request = MessagesRequest;
    type Response = MessagesResponse;
    type Turn = Vec<ContentBlock>;

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn endpoint(&self, config: &LlmConfig) -> Result<String> {
        let base = config.base_url.as_deref().unwrap_or(ANTHROPIC_BASE_URL);
        Ok(format!("{}/messages", base.trim_end_matches('/')))
    }

    fn headers(&self, config: &LlmConfig) -> Result<HeaderMap> {
        let key = config
            .credentials
            .api_key()
            .ok_or_else(|| AgentError::MissingApiKey("Anthropic".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-api-key"), header_value(key)?);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }

    fn encode(&self, request: &CompletionRequest) -> MessagesRequest {
        MessagesRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system_text(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: MessageContent::Text(request.user.clone()),
            }],
            tools: request
                .tools
                .iter()
                .map(|declaration| AnthropicTool {
                    name: declaration.name.clone(),
                    description: declaration.description.clone(),
                    input_schema: declaration.parameters.clone(),
                })
                .collect(),
        }
    }

    fn decode(&self, response: MessagesResponse) -> Result<Decoded<Vec<ContentBlock>>> {
        if let Some(error) = response.error {
            return Err(AgentError::completion("decode", error));
        }

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in &response.content {
            match block {
                ContentBlock::Text { text: part } => text.push_str(part),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, input.to_string()));
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Unsupported => {}
            }
        }

        tracing::trace!(stop_reason = ?response.stop_reason, calls = tool_calls.len(), "anthropic reply");

        let turn = response
            .content
            .into_iter()
            .filter(|block| !matches!(block, ContentBlock::Unsupported))
            .collect();

        Ok(Decoded {
            text,
            tool_calls,
            turn,
        })
    }

    fn push_tool_round(&self, request: &mut MessagesRequest, turn: Vec<ContentBlock>, outputs: Vec<ToolOutput>) {
        request.messages.push(AnthropicMessage {
            role: "assistant",
            content: MessageContent::Blocks(turn),
        });
        request.messages.push(AnthropicMessage {
            role: "user",
            content: MessageContent::Blocks(
                outputs
                    .into_iter()
                    .map(|output| ContentBlock::ToolResult {
                        tool_use_id: output.call_id,
                        content: output.content,
                    })
                    .collect(),
            ),
        });
    }

    fn api_error(&self, body: &[u8]) -> Option<String> {
        serde_json::from_slice::<AnthropicErrorBody>(body)
            .ok()
            .map(|body| body.error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CompletionEngine;
    use crate::testing::{broken_tool, persona, request_bodies, weather_tool};
    use agent_core::LlmProvider;
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_reply(text: &str) -> Value {
        json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn"
        })
    }

    fn tool_reply() -> Value {
        json!({
            "id": "msg_2",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"location": "Paris"}}
            ],
            "stop_reason": "tool_use"
        })
    }

    fn engine(server: &MockServer) -> CompletionEngine<AnthropicCodec> {
        let config = LlmConfig::new()
            .with_provider(ProviderKind::Anthropic)
            .with_model("claude-3-5-sonnet-latest")
            .with_max_retries(1)
            .with_anthropic_credentials("sk-ant-test")
            .with_base_url(format!("{}/v1", server.uri()));
        let mut engine = CompletionEngine::new(AnthropicCodec, &persona(), config).unwrap();
        engine.with_user_prompt("What is the weather in Paris?".into());
        engine
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            AnthropicCodec.endpoint(&LlmConfig::new()).unwrap(),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn test_content_blocks_parse() {
        let blocks: Vec<ContentBlock> = serde_json::from_value(json!([
            {"type": "text", "text": "hi"},
            {"type": "thinking", "thinking": "..."},
            {"type": "tool_use", "id": "t", "name": "n", "input": {}}
        ]))
        .unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1], ContentBlock::Unsupported);
    }

    #[tokio::test]
    async fn test_text_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("Bonjour")))
            .expect(1)
            .mount(&server)
            .await;

        let result = engine(&server)
            .completion(&CancellationToken::new(), &[])
            .await
            .unwrap();
        assert_eq!(result, "Bonjour");

        let body = &request_bodies(&server).await[0];
        assert_eq!(body["model"], "claude-3-5-sonnet-latest");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(
            body["system"],
            "As a weather assistant, you report current conditions\nYour goal is answer weather questions briefly"
        );
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "What is the weather in Paris?");
    }

    #[tokio::test]
    async fn test_tool_use_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("Sunny and 22C.")))
            .mount(&server)
            .await;

        let mut engine = engine(&server);
        let (shape, function) = weather_tool();
        engine.add_custom_tools("get_weather", "Current weather for a city", shape, function);

        let result = engine.completion(&CancellationToken::new(), &[]).await.unwrap();
        assert_eq!(result, "Sunny and 22C.");

        let bodies = request_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["tools"][0]["name"], "get_weather");
        assert_eq!(bodies[0]["tools"][0]["input_schema"]["type"], "object");

        let messages = bodies[1]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["input"]["location"], "Paris");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(
            messages[2]["content"][0],
            json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "Sunny, 22C in Paris"})
        );
    }

    #[tokio::test]
    async fn test_failing_tool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply()))
            .mount(&server)
            .await;

        let mut engine = engine(&server);
        let (shape, function) = broken_tool();
        engine.add_custom_tools("get_weather", "Current weather for a city", shape, function);

        let err = engine.completion(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolCallFailed { .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_round_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply()))
            .mount(&server)
            .await;

        let mut engine = engine(&server).with_max_tool_rounds(2);
        let (shape, function) = weather_tool();
        engine.add_custom_tools("get_weather", "Current weather for a city", shape, function);

        let err = engine.completion(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxToolRoundsExceeded(2)));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_error_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let err = engine(&server)
            .completion(&CancellationToken::new(), &[])
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("API error [authentication_error]: invalid x-api-key"));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let server = MockServer::start().await;
        let config = LlmConfig::new()
            .with_provider(ProviderKind::Anthropic)
            .with_model("claude-3-5-sonnet-latest")
            .with_base_url(server.uri());
        let mut engine = CompletionEngine::new(AnthropicCodec, &persona(), config).unwrap();
        engine.with_user_prompt("hi".into());

        let err = engine.completion(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingApiKey(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
