//! Echo action: returns its `text` argument unchanged.

use async_trait::async_trait;
use ctxweave_core::action::Action;
use ctxweave_core::error::ActionError;

pub struct EchoAction;

#[async_trait]
impl Action for EchoAction {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to echo" }
            },
            "required": ["text"]
        })
    }

    async fn invoke(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ActionError> {
        let text = crate::required_str(&arguments, "text")?;
        Ok(serde_json::Value::String(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxweave_core::action::render_output;

    #[tokio::test]
    async fn echoes_text() {
        let mut args = serde_json::Map::new();
        args.insert("text".into(), serde_json::json!("hi"));
        let out = EchoAction.invoke(args).await.unwrap();
        assert_eq!(render_output(&out), "hi");
    }

    #[tokio::test]
    async fn non_string_text_is_invalid() {
        let mut args = serde_json::Map::new();
        args.insert("text".into(), serde_json::json!(42));
        assert!(EchoAction.invoke(args).await.is_err());
    }
}
