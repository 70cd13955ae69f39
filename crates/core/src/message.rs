//! Message domain types.
//!
//! These are the value objects that flow through every turn:
//! the user writes a message, the engine assembles context around the history,
//! the generation backend answers, and requested actions add result messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Static framing (directive, context, procedure guidance)
    System,
    /// The end user
    User,
    /// The generation backend
    Agent,
    /// Output of a requested action
    ActionResult,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Agent => "agent",
            Self::ActionResult => "action_result",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request from a generated reply to run a named action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    /// Call identifier, echoed back on the result message
    pub id: String,

    /// Name of the action to invoke
    pub name: String,

    /// Arguments as a JSON mapping
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ActionCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A single entry in a conversation's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Actions requested by the agent (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionCall>,

    /// If this is an action result, which call it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            actions: Vec::new(),
            action_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new agent message.
    pub fn agent(content: impl Into<String>) -> Self {
        Self::with_role(Role::Agent, content)
    }

    /// Create a new agent message that requests actions.
    pub fn agent_with_actions(content: impl Into<String>, actions: Vec<ActionCall>) -> Self {
        let mut msg = Self::with_role(Role::Agent, content);
        msg.actions = actions;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create an action result message.
    pub fn action_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::ActionResult, content);
        msg.action_call_id = Some(call_id.into());
        msg
    }

    /// Whether this is an agent message carrying at least one action request.
    pub fn requests_actions(&self) -> bool {
        self.role == Role::Agent && !self.actions.is_empty()
    }
}
