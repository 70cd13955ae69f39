//! Action trait: side-effecting operations the agent can request.
//!
//! A generated reply may carry [`ActionCall`]s. The turn graph looks each one
//! up by name in the [`ActionRegistry`]; unknown names produce no result.

use crate::error::ActionError;
use crate::message::ActionCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An action definition sent to the generation backend so it knows what it can request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// The action name
    pub name: String,

    /// Description of what the action does
    pub description: String,

    /// JSON Schema describing the action's parameters
    pub parameters: serde_json::Value,
}

/// The core Action trait.
#[async_trait]
pub trait Action: Send + Sync {
    /// The unique name of this action (e.g., "strlen").
    fn name(&self) -> &str;

    /// A description of what this action does (sent to the backend).
    fn description(&self) -> &str;

    /// JSON Schema describing this action's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Invoke the action with the given argument mapping.
    async fn invoke(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<serde_json::Value, ActionError>;

    /// Convert this action into an ActionDefinition for the backend.
    fn to_definition(&self) -> ActionDefinition {
        ActionDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of named actions.
///
/// Keyed by name in a `BTreeMap` so definitions come out in a stable order.
pub struct ActionRegistry {
    actions: BTreeMap<String, Box<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    /// Register an action. Replaces any existing action with the same name.
    pub fn register(&mut self, action: Box<dyn Action>) {
        let name = action.name().to_string();
        self.actions.insert(name, action);
    }

    /// Get an action by name.
    pub fn get(&self, name: &str) -> Option<&dyn Action> {
        self.actions.get(name).map(|a| a.as_ref())
    }

    /// Get all action definitions (for sending to the backend).
    pub fn definitions(&self) -> Vec<ActionDefinition> {
        self.actions.values().map(|a| a.to_definition()).collect()
    }

    /// Invoke an action call.
    pub async fn invoke(
        &self,
        call: &ActionCall,
    ) -> std::result::Result<serde_json::Value, ActionError> {
        let action = self
            .actions
            .get(&call.name)
            .ok_or_else(|| ActionError::NotFound(call.name.clone()))?;
        action.invoke(call.arguments.clone()).await
    }

    /// List all registered action names.
    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Stringify an action's output for a result message.
///
/// JSON strings are emitted raw; everything else uses its JSON text.
pub fn render_output(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
