//! Strlen action: counts the characters of a string.

use async_trait::async_trait;
use ctxweave_core::action::Action;
use ctxweave_core::error::ActionError;

pub struct StrlenAction;

#[async_trait]
impl Action for StrlenAction {
    fn name(&self) -> &str {
        "strlen"
    }

    fn description(&self) -> &str {
        "Return the number of characters in a string."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The string to measure"
                }
            },
            "required": ["text"]
        })
    }

    async fn invoke(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ActionError> {
        let text = crate::required_str(&arguments, "text")?;
        Ok(serde_json::json!(text.chars().count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxweave_core::action::render_output;

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn counts_characters_not_bytes() {
        let out = StrlenAction
            .invoke(args(serde_json::json!({"text": "héllo"})))
            .await
            .unwrap();
        assert_eq!(render_output(&out), "5");

        let out = StrlenAction
            .invoke(args(serde_json::json!({"text": "上下文"})))
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!(3));
    }

    #[tokio::test]
    async fn missing_text_is_invalid() {
        let err = StrlenAction.invoke(serde_json::Map::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidArguments(_)));
    }
}
