//! Google Gemini `generateContent`
//!
//! Gemini function calls carry no ids, so each one gets a synthetic id
//! before it reaches the tool registry. Results go back as
//! `functionResponse` parts in a user turn.

use agent_core::{
    LlmConfig,
    error::{AgentError, Result},
    message::CompletionRequest,
    provider::ProviderKind,
    tool::{ParameterSchema, ToolCall, ToolOutput},
};
use reqwest::header::{HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::{Decoded, WireCodec};
use crate::openai::header_value;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTools>,
    generation_config: GenerationConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn new(role: Option<&str>, parts: Vec<Part>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    /// Marks reasoning text from thinking models; never part of the answer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    thought: bool,
    /// Opaque token thinking models expect back on the echoed turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: ParameterSchema,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: u16,
    message: String,
    #[serde(default)]
    status: String,
}

impl std::fmt::Display for GeminiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API error [{} {}]: {}", self.code, self.status, self.message)
    }
}

/// Codec for `POST {model}:generateContent`
#[derive(Clone, Copy, Debug, Default)]
pub struct GeminiCodec;

impl WireCodec for GeminiCodec {
    type Request = GenerateRequest;
    type Response = GenerateResponse;
    type Turn = Content;

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn endpoint(&self, config: &LlmConfig) -> Result<String> {
        let base = config.base_url.as_deref().unwrap_or(GEMINI_BASE_URL);
        Ok(format!(
            "{}/{}:generateContent",
            base.trim_end_matches('/'),
            config.model
        ))
    }

    fn headers(&self, config: &LlmConfig) -> Result<HeaderMap> {
        let key = config
            .credentials
            .api_key()
            .ok_or_else(|| AgentError::MissingApiKey("Gemini".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-goog-api-key"), header_value(key)?);
        Ok(headers)
    }

    fn encode(&self, request: &CompletionRequest) -> GenerateRequest {
        let system = request.system_text();
        let declarations: Vec<FunctionDeclaration> = request
            .tools
            .iter()
            .map(|declaration| FunctionDeclaration {
                name: declaration.name.clone(),
                description: declaration.description.clone(),
                parameters: declaration.parameters.clone(),
            })
            .collect();

        GenerateRequest {
            contents: vec![Content::new(Some("user"), vec![Part::text(request.user.clone())])],
            system_instruction: (!system.is_empty()).then(|| Content::new(None, vec![Part::text(system)])),
            tools: if declarations.is_empty() {
                Vec::new()
            } else {
                vec![GeminiTools {
                    function_declarations: declarations,
                }]
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    fn decode(&self, response: GenerateResponse) -> Result<Decoded<Content>> {
        if let Some(error) = response.error {
            return Err(AgentError::completion("decode", error));
        }

        let mut content = response
            .candidates
            .into_iter()
            .next()
            .map(|candidate| candidate.content)
            .ok_or_else(|| AgentError::completion("decode", "response contained no candidates"))?;
        content.role = Some("model".to_string());

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in &content.parts {
            if let Some(part_text) = part.text.as_deref().filter(|_| !part.thought) {
                text.push_str(part_text);
            }
            if let Some(call) = &part.function_call {
                let arguments =
                    serde_json::to_string(&call.args).map_err(|e| AgentError::completion("decode", e))?;
                let id = format!("call_{}", uuid::Uuid::new_v4().simple());
                tool_calls.push(ToolCall::new(id, &call.name, arguments));
            }
        }

        Ok(Decoded {
            text,
            tool_calls,
            turn: content,
        })
    }

    fn push_tool_round(&self, request: &mut GenerateRequest, turn: Content, outputs: Vec<ToolOutput>) {
        request.contents.push(turn);

        let parts = outputs
            .into_iter()
            .map(|output| Part {
                function_response: Some(FunctionResponse {
                    name: output.name,
                    response: serde_json::json!({ "result": output.content }),
                }),
                ..Part::default()
            })
            .collect();
        request.contents.push(Content::new(Some("user"), parts));
    }

    fn api_error(&self, body: &[u8]) -> Option<String> {
        serde_json::from_slice::<GeminiErrorBody>(body)
            .ok()
            .map(|body| body.error.to_string())
    }
}
