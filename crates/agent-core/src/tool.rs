//! Tool System
//!
//! Tools the model may invoke during a completion. Two flavours exist:
//!
//! - **built-in** tools implement [`Tool`] and take a single string input,
//!   declared to the model as an object with one `input` field;
//! - **custom** tools are plain functions registered with an explicit
//!   [`FunctionShape`] and receive the raw JSON arguments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, BoxError, Result};

/// Outcome of a tool execution
pub type ToolResult = std::result::Result<String, BoxError>;

/// Executable behind a custom tool
pub type ToolFn = Arc<dyn Fn(&str) -> ToolResult + Send + Sync>;

/// Wrap a closure as a custom tool executable
pub fn tool_fn<F>(function: F) -> ToolFn
where
    F: Fn(&str) -> ToolResult + Send + Sync + 'static,
{
    Arc::new(function)
}

/// Name of the single parameter every built-in tool declares
pub const BUILTIN_INPUT_FIELD: &str = "input";

/// Tool trait - implement to add new built-in capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool identifier
    fn name(&self) -> &str;

    /// Human-readable description (shown to the model)
    fn description(&self) -> &str;

    /// Execute the tool with its `input` argument
    async fn call(&self, cancel: &CancellationToken, input: &str) -> ToolResult;
}

/// Properties of one custom-tool parameter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionProps {
    pub description: String,
    pub required: bool,
}

/// Parameter name to properties, kept sorted so declarations are stable
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionShape(BTreeMap<String, FunctionProps>);

impl FunctionShape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter definition
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.0.insert(
            name.into(),
            FunctionProps {
                description: description.into(),
                required,
            },
        );
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FunctionProps)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// JSON-schema property (all tool parameters are strings)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub property_type: String,

    pub description: String,
}

/// JSON-schema object describing a tool's parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,

    pub properties: BTreeMap<String, PropertySchema>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl ParameterSchema {
    fn object(properties: BTreeMap<String, PropertySchema>, required: Vec<String>) -> Self {
        Self {
            schema_type: "object".into(),
            properties,
            required,
        }
    }
}

impl From<&FunctionShape> for ParameterSchema {
    fn from(shape: &FunctionShape) -> Self {
        let properties = shape
            .iter()
            .map(|(name, props)| {
                (
                    name.clone(),
                    PropertySchema {
                        property_type: "string".into(),
                        description: props.description.clone(),
                    },
                )
            })
            .collect();
        let required = shape
            .iter()
            .filter(|(_, props)| props.required)
            .map(|(name, _)| name.clone())
            .collect();
        Self::object(properties, required)
    }
}

/// Tool definition advertised to the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl ToolDeclaration {
    /// Declaration for a built-in tool: one required `input` string
    pub fn builtin(name: impl Into<String>, description: impl Into<String>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            BUILTIN_INPUT_FIELD.to_string(),
            PropertySchema {
                property_type: "string".into(),
                description: BUILTIN_INPUT_FIELD.into(),
            },
        );
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParameterSchema::object(properties, vec![BUILTIN_INPUT_FIELD.into()]),
        }
    }

    pub fn custom(
        name: impl Into<String>,
        description: impl Into<String>,
        shape: &FunctionShape,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParameterSchema::from(shape),
        }
    }
}

/// Tool call request from the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider call id, echoed back with the result
    pub id: String,

    pub name: String,

    /// Arguments as a JSON object in text form
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// The `input` field for built-in tools; falls back to the raw arguments
    /// when they are not an object carrying a string `input`.
    pub fn builtin_input(&self) -> String {
        serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&self.arguments)
            .ok()
            .and_then(|map| match map.get(BUILTIN_INPUT_FIELD) {
                Some(serde_json::Value::String(input)) => Some(input.clone()),
                _ => None,
            })
            .unwrap_or_else(|| self.arguments.clone())
    }
}

/// Output of one executed tool call, fed back to the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub name: String,
    pub content: String,
}

#[derive(Clone)]
enum Executable {
    Builtin(Arc<dyn Tool>),
    Custom(ToolFn),
}

/// Registry for the tools of one provider instance
///
/// Registration happens before completions run; lookups afterwards are
/// read-only. Registering a name twice replaces both the executable and the
/// declaration, keeping the declaration's original position.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    executables: HashMap<String, Executable>,
    declarations: Vec<ToolDeclaration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in tool
    pub fn register_builtin(&mut self, tool: Arc<dyn Tool>) {
        let declaration = ToolDeclaration::builtin(tool.name(), tool.description());
        tracing::debug!(tool = %declaration.name, "registering built-in tool");
        self.executables
            .insert(declaration.name.clone(), Executable::Builtin(tool));
        self.upsert(declaration);
    }

    /// Register a custom tool
    pub fn register_custom(
        &mut self,
        name: &str,
        description: &str,
        shape: &FunctionShape,
        function: ToolFn,
    ) {
        tracing::debug!(tool = %name, params = shape.len(), "registering custom tool");
        self.executables
            .insert(name.to_string(), Executable::Custom(function));
        self.upsert(ToolDeclaration::custom(name, description, shape));
    }

    fn upsert(&mut self, declaration: ToolDeclaration) {
        match self
            .declarations
            .iter_mut()
            .find(|existing| existing.name == declaration.name)
        {
            Some(existing) => {
                tracing::warn!(tool = %declaration.name, "tool re-registered, replacing");
                *existing = declaration;
            }
            None => self.declarations.push(declaration),
        }
    }

    /// Declarations in registration order
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    /// `Some(true)` for built-ins, `Some(false)` for custom tools
    pub fn is_builtin(&self, name: &str) -> Option<bool> {
        self.executables
            .get(name)
            .map(|exec| matches!(exec, Executable::Builtin(_)))
    }

    /// Execute a tool call, wrapping every failure as `ToolCallFailed`
    pub async fn execute(&self, cancel: &CancellationToken, call: &ToolCall) -> Result<ToolOutput> {
        let executable = self
            .executables
            .get(&call.name)
            .ok_or_else(|| AgentError::tool_failed(&call.name, "unknown tool"))?;

        let content = match executable {
            Executable::Builtin(tool) => tool.call(cancel, &call.builtin_input()).await,
            Executable::Custom(function) => function(&call.arguments),
        }
        .map_err(|source| AgentError::tool_failed(&call.name, source))?;

        Ok(ToolOutput {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.declarations.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// DateTime tool - returns the current UTC time
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "datetime"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Input is the output format: 'iso', 'unix' or 'human'."
    }

    async fn call(&self, _cancel: &CancellationToken, input: &str) -> ToolResult {
        let now = chrono::Utc::now();

        Ok(match input.trim() {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            _ => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
        })
    }
}

/// Calculator tool - evaluates arithmetic expressions
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression such as '(2 + 3) * 4' or '2 ^ 8'."
    }

    async fn call(&self, _cancel: &CancellationToken, input: &str) -> ToolResult {
        let value = Expression::parse(input)?;
        Ok(format!("{} = {value}", input.trim()))
    }
}

/// Recursive-descent evaluator for `+ - * / ^` and parentheses
struct Expression<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Expression<'a> {
    fn parse(source: &'a str) -> std::result::Result<f64, String> {
        let mut expr = Expression {
            bytes: source.as_bytes(),
            pos: 0,
        };
        let value = expr.sum()?;
        expr.skip_whitespace();
        if expr.pos != expr.bytes.len() {
            return Err(format!("unexpected character at position {}", expr.pos));
        }
        Ok(value)
    }

    fn skip_whitespace(&mut self) {
        while self.bytes.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.bytes.get(self.pos).copied()
    }

    fn sum(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.product()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn product(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.power()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.power()?;
            if op == b'/' && rhs == 0.0 {
                return Err("division by zero".into());
            }
            value = if op == b'*' { value * rhs } else { value / rhs };
        }
        Ok(value)
    }

    // right-associative
    fn power(&mut self) -> std::result::Result<f64, String> {
        let base = self.unary()?;
        if self.peek() == Some(b'^') {
            self.pos += 1;
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> std::result::Result<f64, String> {
        if self.peek() == Some(b'-') {
            self.pos += 1;
            return Ok(-self.unary()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> std::result::Result<f64, String> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.sum()?;
                if self.peek() != Some(b')') {
                    return Err("missing closing parenthesis".into());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => {
                let start = self.pos;
                while self
                    .bytes
                    .get(self.pos)
                    .is_some_and(|c| c.is_ascii_digit() || *c == b'.')
                {
                    self.pos += 1;
                }
                let literal = std::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|e| e.to_string())?;
                literal
                    .parse::<f64>()
                    .map_err(|e| format!("invalid number {literal:?}: {e}"))
            }
            Some(c) => Err(format!("unexpected character {:?}", c as char)),
            None => Err("unexpected end of expression".into()),
        }
    }
}
