//! Shared fixtures for the wiremock provider tests

use agent_core::{
    Agent,
    tool::{FunctionShape, ToolFn, tool_fn},
};
use serde_json::Value;
use wiremock::MockServer;

pub(crate) fn persona() -> Agent {
    Agent::new()
        .with_role("weather assistant")
        .with_backstory("you report current conditions")
        .with_goal("answer weather questions briefly")
}

/// Custom `get_weather(location)` tool shape and executable
pub(crate) fn weather_tool() -> (FunctionShape, ToolFn) {
    let shape = FunctionShape::new().with_property("location", "city to look up", true);
    let function = tool_fn(|args| {
        let args: Value = serde_json::from_str(args)?;
        let location = args["location"].as_str().unwrap_or("unknown");
        Ok(format!("Sunny, 22C in {location}"))
    });
    (shape, function)
}

/// Custom tool that always fails
pub(crate) fn broken_tool() -> (FunctionShape, ToolFn) {
    let shape = FunctionShape::new().with_property("location", "city to look up", true);
    let function = tool_fn(|_| Err("weather service offline".into()));
    (shape, function)
}

/// JSON bodies of every request the mock server received
pub(crate) async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.body_json().unwrap_or(Value::Null))
        .collect()
}
