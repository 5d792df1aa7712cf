//! Agent Persona
//!
//! Role, backstory and goal seeding the system prompt of every completion.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::PromptMessage;

/// An AI agent with a role, backstory and goal
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub role: String,
    pub backstory: String,
    pub goal: String,
}

impl Agent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = goal.into();
        self
    }

    /// All three persona fields must be non-empty
    pub fn validate(&self) -> Result<()> {
        if self.role.is_empty() {
            return Err(AgentError::MissingRole);
        }
        if self.backstory.is_empty() {
            return Err(AgentError::MissingBackstory);
        }
        if self.goal.is_empty() {
            return Err(AgentError::MissingGoal);
        }
        Ok(())
    }

    /// Persona lines sent ahead of the user turn
    pub fn system_prompts(&self) -> Vec<PromptMessage> {
        vec![
            PromptMessage::system(format!("As a {}, {}", self.role, self.backstory)),
            PromptMessage::system(format!("Your goal is {}", self.goal)),
        ]
    }
}
