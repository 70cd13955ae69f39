//! Built-in actions for ctxweave.
//!
//! Actions are side-effecting operations a generated reply may request
//! before the agent produces its final answer.

pub mod echo;
pub mod strlen;

use ctxweave_core::action::ActionRegistry;

/// Create a registry holding every built-in action.
pub fn default_registry() -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(Box::new(strlen::StrlenAction));
    registry.register(Box::new(echo::EchoAction));
    registry
}

/// Read a required string argument.
pub(crate) fn required_str<'a>(
    arguments: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'a str, ctxweave_core::error::ActionError> {
    arguments.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
        ctxweave_core::error::ActionError::InvalidArguments(format!("Missing '{key}' argument"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_builtins() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["echo", "strlen"]);
        assert_eq!(registry.definitions().len(), 2);
    }
}
