//! OpenAI and Azure OpenAI
//!
//! Both speak the chat-completions format; they differ in URL layout and
//! authentication header. The chat types are shared with the Ollama codec.

use agent_core::{
    LlmConfig,
    error::{AgentError, Result},
    message::CompletionRequest,
    provider::ProviderKind,
    tool::{ParameterSchema, ToolCall, ToolOutput},
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::engine::{Decoded, WireCodec};

/// Public OpenAI API base
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Azure OpenAI REST API version
pub const AZURE_API_VERSION: &str = "2024-02-01";

// ============================================================================
// Chat-completions wire types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn tool_result(output: ToolOutput) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(output.content),
            name: Some(output.name),
            tool_calls: None,
            tool_call_id: Some(output.call_id),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: ChatFunctionCall,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: ChatFunction,
}

#[derive(Debug, Serialize)]
pub struct ChatFunction {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatErrorBody {
    error: ChatErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

// ============================================================================
// Shared translation
// ============================================================================

pub(crate) fn encode_chat(request: &CompletionRequest) -> ChatRequest {
    let mut messages: Vec<ChatMessage> = request
        .system
        .iter()
        .map(|m| ChatMessage::text(m.role.as_str(), m.content.clone()))
        .collect();
    messages.push(ChatMessage::text("user", request.user.clone()));

    let tools = request
        .tools
        .iter()
        .map(|declaration| ChatTool {
            kind: "function",
            function: ChatFunction {
                name: declaration.name.clone(),
                description: declaration.description.clone(),
                parameters: declaration.parameters.clone(),
            },
        })
        .collect();

    ChatRequest {
        model: request.model.clone(),
        messages,
        tools,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

pub(crate) fn decode_chat(response: ChatResponse) -> Result<Decoded<ChatMessage>> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| AgentError::completion("decode", "response contained no choices"))?;

    let tool_calls = message
        .tool_calls
        .iter()
        .flatten()
        .map(|call| ToolCall::new(&call.id, &call.function.name, &call.function.arguments))
        .collect();

    Ok(Decoded {
        text: message.content.clone().unwrap_or_default(),
        tool_calls,
        turn: message,
    })
}

pub(crate) fn push_chat_round(request: &mut ChatRequest, turn: ChatMessage, outputs: Vec<ToolOutput>) {
    request.messages.push(turn);
    request
        .messages
        .extend(outputs.into_iter().map(ChatMessage::tool_result));
}

pub(crate) fn chat_api_error(body: &[u8]) -> Option<String> {
    let body: ChatErrorBody = serde_json::from_slice(body).ok()?;
    Some(match body.error.kind {
        Some(kind) => format!("API error [{kind}]: {}", body.error.message),
        None => format!("API error: {}", body.error.message),
    })
}

pub(crate) fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| AgentError::InvalidConfig("credential contains invalid header characters".into()))
}

// ============================================================================
// Codec
// ============================================================================

/// Chat-completions codec for OpenAI or Azure OpenAI
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenAiCodec {
    OpenAi,
    Azure,
}

impl OpenAiCodec {
    /// Azure deployment name for a model id: dots and colons removed
    pub fn azure_deployment(model: &str) -> String {
        model.replace(['.', ':'], "")
    }
}

impl WireCodec for OpenAiCodec {
    type Request = ChatRequest;
    type Response = ChatResponse;
    type Turn = ChatMessage;

    fn kind(&self) -> ProviderKind {
        match self {
            OpenAiCodec::OpenAi => ProviderKind::OpenAi,
            OpenAiCodec::Azure => ProviderKind::Azure,
        }
    }

    fn endpoint(&self, config: &LlmConfig) -> Result<String> {
        match self {
            OpenAiCodec::OpenAi => {
                let base = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
                Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
            }
            OpenAiCodec::Azure => {
                let base = config
                    .base_url
                    .as_deref()
                    .or_else(|| config.credentials.endpoint())
                    .ok_or_else(|| AgentError::MissingEndpoint("Azure OpenAI".into()))?;
                Ok(format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={AZURE_API_VERSION}",
                    base.trim_end_matches('/'),
                    Self::azure_deployment(&config.model),
                ))
            }
        }
    }

    fn headers(&self, config: &LlmConfig) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        match self {
            OpenAiCodec::OpenAi => {
                let key = config
                    .credentials
                    .api_key()
                    .ok_or_else(|| AgentError::MissingApiKey("OpenAI".into()))?;
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {key}"))?);
            }
            OpenAiCodec::Azure => {
                let key = config
                    .credentials
                    .api_key()
                    .ok_or_else(|| AgentError::MissingApiKey("Azure OpenAI".into()))?;
                headers.insert(HeaderName::from_static("api-key"), header_value(key)?);
            }
        }
        Ok(headers)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CompletionEngine;
    use crate::testing::{broken_tool, persona, request_bodies, weather_tool};
    use agent_core::{AgentError, LlmProvider, tool::CalculatorTool};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_reply(text: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }]
        })
    }

    fn tool_reply(name: &str, arguments: &str) -> Value {
        json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": name, "arguments": arguments}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })
    }

    fn engine(server: &MockServer) -> CompletionEngine<OpenAiCodec> {
        let config = LlmConfig::new()
            .with_provider(ProviderKind::OpenAi)
            .with_model("gpt-4o")
            .with_max_retries(1)
            .with_openai_credentials("test-key")
            .with_base_url(server.uri());
        let mut engine = CompletionEngine::new(OpenAiCodec::OpenAi, &persona(), config).unwrap();
        engine.with_user_prompt("What is the weather in Paris?".into());
        engine
    }

    #[test]
    fn test_endpoints() {
        let openai = LlmConfig::new().with_model("gpt-4o");
        assert_eq!(
            OpenAiCodec::OpenAi.endpoint(&openai).unwrap(),
            "https://api.openai.com/v1/chat/completions"
        );

        let azure = LlmConfig::new()
            .with_model("gpt-3.5-turbo")
            .with_azure_openai_credentials("key", "https://example.openai.azure.com/");
        assert_eq!(
            OpenAiCodec::Azure.endpoint(&azure).unwrap(),
            "https://example.openai.azure.com/openai/deployments/gpt-35-turbo/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_missing_credentials() {
        let config = LlmConfig::new().with_model("gpt-4o");
        assert!(matches!(
            OpenAiCodec::OpenAi.headers(&config),
            Err(AgentError::MissingApiKey(_))
        ));
        assert!(matches!(
            OpenAiCodec::Azure.endpoint(&config),
            Err(AgentError::MissingEndpoint(_))
        ));
    }

    #[test]
    fn test_api_error_extraction() {
        let body = br#"{"error":{"message":"Invalid API key","type":"invalid_request_error"}}"#;
        assert_eq!(
            chat_api_error(body).unwrap(),
            "API error [invalid_request_error]: Invalid API key"
        );
        assert!(chat_api_error(b"<html>").is_none());
    }

    #[tokio::test]
    async fn test_plain_text_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("Hello from mock")))
            .expect(1)
            .mount(&server)
            .await;

        let result = engine(&server)
            .completion(&CancellationToken::new(), &[])
            .await
            .unwrap();
        assert_eq!(result, "Hello from mock");

        let bodies = request_bodies(&server).await;
        let messages = bodies[0]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "As a weather assistant, you report current conditions");
        assert_eq!(messages[1]["content"], "Your goal is answer weather questions briefly");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(bodies[0]["model"], "gpt-4o");
        assert!(bodies[0].get("tools").is_none());
    }

    #[tokio::test]
    async fn test_context_is_appended_to_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("ok")))
            .mount(&server)
            .await;

        engine(&server)
            .completion(&CancellationToken::new(), &["it rained yesterday"])
            .await
            .unwrap();

        let bodies = request_bodies(&server).await;
        assert_eq!(
            bodies[0]["messages"][2]["content"],
            "What is the weather in Paris?\n\nTake in consideration the following context: it rained yesterday"
        );
    }

    #[tokio::test]
    async fn test_prompt_errors_send_nothing() {
        let server = MockServer::start().await;

        let err = engine(&server)
            .completion(&CancellationToken::new(), &["one", "two"])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::TooManyArgs));

        let config = LlmConfig::new()
            .with_provider(ProviderKind::OpenAi)
            .with_model("gpt-4o")
            .with_openai_credentials("test-key")
            .with_base_url(server.uri());
        let bare = CompletionEngine::new(OpenAiCodec::OpenAi, &persona(), config).unwrap();
        let err = bare.completion(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingPrompt));

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_tool_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(tool_reply("get_weather", r#"{"location":"Paris"}"#)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("It is sunny in Paris.")))
            .mount(&server)
            .await;

        let mut engine = engine(&server);
        let (shape, function) = weather_tool();
        engine.add_custom_tools("get_weather", "Current weather for a city", shape, function);

        let result = engine.completion(&CancellationToken::new(), &[]).await.unwrap();
        assert_eq!(result, "It is sunny in Paris.");

        let bodies = request_bodies(&server).await;
        assert_eq!(bodies.len(), 2);

        let tool = &bodies[0]["tools"][0];
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["function"]["name"], "get_weather");
        assert_eq!(tool["function"]["parameters"]["required"], json!(["location"]));

        let messages = bodies[1]["messages"].as_array().unwrap();
        let assistant = &messages[3];
        assert_eq!(assistant["role"], "assistant");
        assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
        let result = &messages[4];
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_call_id"], "call_1");
        assert_eq!(result["name"], "get_weather");
        assert_eq!(result["content"], "Sunny, 22C in Paris");
    }

    #[tokio::test]
    async fn test_builtin_tool_receives_input_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(tool_reply("calculate", r#"{"input":"6 * 7"}"#)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("42")))
            .mount(&server)
            .await;

        let mut engine = engine(&server);
        engine.with_tools(vec![Arc::new(CalculatorTool)]);
        assert_eq!(engine.completion(&CancellationToken::new(), &[]).await.unwrap(), "42");

        let bodies = request_bodies(&server).await;
        assert_eq!(bodies[1]["messages"][4]["content"], "6 * 7 = 42");
    }

    /// Built-in tool that cancels the surrounding completion when called
    struct AbortTool;

    #[async_trait::async_trait]
    impl agent_core::Tool for AbortTool {
        fn name(&self) -> &str {
            "abort"
        }

        fn description(&self) -> &str {
            "Stop the current request"
        }

        async fn call(&self, cancel: &CancellationToken, _input: &str) -> agent_core::tool::ToolResult {
            cancel.cancel();
            Ok("aborted".into())
        }
    }

    #[tokio::test]
    async fn test_tool_cancelling_stops_follow_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply("abort", r#"{"input":""}"#)))
            .mount(&server)
            .await;

        let mut engine = engine(&server);
        engine.with_tools(vec![Arc::new(AbortTool)]);

        let err = engine.completion(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled), "{err}");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_reply("launch_rocket", "{}")))
            .mount(&server)
            .await;

        let err = engine(&server)
            .completion(&CancellationToken::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolCallFailed { ref tool, .. } if tool == "launch_rocket"));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_tool_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(tool_reply("get_weather", r#"{"location":"Paris"}"#)),
            )
            .mount(&server)
            .await;

        let mut engine = engine(&server);
        let (shape, function) = broken_tool();
        engine.add_custom_tools("get_weather", "Current weather for a city", shape, function);

        let err = engine.completion(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolCallFailed { .. }));
        assert!(err.to_string().contains("weather service offline"));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tool_round_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(tool_reply("get_weather", r#"{"location":"Paris"}"#)),
            )
            .mount(&server)
            .await;

        let mut engine = engine(&server);
        let (shape, function) = weather_tool();
        engine.add_custom_tools("get_weather", "Current weather for a city", shape, function);

        let err = engine.completion(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxToolRoundsExceeded(10)));
        assert_eq!(server.received_requests().await.unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_follow_up_failure_carries_round() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(tool_reply("get_weather", r#"{"location":"Paris"}"#)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "context too long", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let mut engine = engine(&server);
        let (shape, function) = weather_tool();
        engine.add_custom_tools("get_weather", "Current weather for a city", shape, function);

        let err = engine.completion(&CancellationToken::new(), &[]).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("follow-up round 1"), "{message}");
        assert!(message.contains("context too long"), "{message}");
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = engine(&server)
            .completion(&CancellationToken::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::CompletionFailed(_)));
    }

    #[tokio::test]
    async fn test_azure_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .and(query_param("api-version", AZURE_API_VERSION))
            .and(header("api-key", "azure-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("from azure")))
            .expect(1)
            .mount(&server)
            .await;

        let config = LlmConfig::new()
            .with_provider(ProviderKind::Azure)
            .with_model("gpt-4o")
            .with_azure_openai_credentials("azure-key", server.uri());
        let mut engine = CompletionEngine::new(OpenAiCodec::Azure, &persona(), config).unwrap();
        engine.with_user_prompt("hi".into());

        let result = engine.completion(&CancellationToken::new(), &[]).await.unwrap();
        assert_eq!(result, "from azure");
    }

    #[tokio::test]
    async fn test_missing_key_sends_nothing() {
        let server = MockServer::start().await;
        let config = LlmConfig::new()
            .with_provider(ProviderKind::OpenAi)
            .with_model("gpt-4o")
            .with_base_url(server.uri());
        let mut engine = CompletionEngine::new(OpenAiCodec::OpenAi, &persona(), config).unwrap();
        engine.with_user_prompt("hi".into());

        let err = engine.completion(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingApiKey(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
