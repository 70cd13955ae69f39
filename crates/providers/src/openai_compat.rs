//! OpenAI-compatible provider implementation.
//!
//! Works with DashScope compatible-mode (the default backend), OpenAI, Ollama,
//! vLLM, and any endpoint exposing `/chat/completions`.
//!
//! Action requests travel as OpenAI `tool_calls`: the registry's definitions
//! are sent as `tools`, and returned calls are parsed back into [`ActionCall`]s.

use async_trait::async_trait;
use ctxweave_config::LlmConfig;
use ctxweave_core::action::ActionDefinition;
use ctxweave_core::error::ProviderError;
use ctxweave_core::message::{ActionCall, Message, Role};
use ctxweave_core::provider::{ProviderRequest, ProviderResponse, Usage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible generation backend.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// DashScope compatible-mode endpoint (convenience constructor).
    pub fn dashscope(api_key: impl Into<String>) -> Self {
        Self::new(
            "dashscope",
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
            api_key,
        )
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama ignores the key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system".into(),
                    Role::User => "user".into(),
                    Role::Agent => "assistant".into(),
                    Role::ActionResult => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: (!m.actions.is_empty()).then(|| {
                    m.actions
                        .iter()
                        .map(|call| ApiToolCall {
                            id: call.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: call.name.clone(),
                                arguments: serde_json::Value::Object(call.arguments.clone())
                                    .to_string(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: m.action_call_id.clone(),
            })
            .collect()
    }

    /// Convert action definitions to OpenAI tool format.
    fn to_api_tools(actions: &[ActionDefinition]) -> Vec<ApiToolDefinition> {
        actions
            .iter()
            .map(|a| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: a.name.clone(),
                    description: a.description.clone(),
                    parameters: a.parameters.clone(),
                },
            })
            .collect()
    }

    /// Turn a decoded completion into an agent message.
    fn parse_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let actions: Vec<ActionCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ActionCall::new(tc.id, tc.function.name, parse_arguments(&tc.function.arguments)))
            .collect();

        let message = Message::agent_with_actions(choice.message.content.unwrap_or_default(), actions);

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model,
        })
    }
}

/// Decode a tool-call argument string. Anything but a JSON object becomes an empty map.
fn parse_arguments(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            if !raw.trim().is_empty() {
                debug!(arguments = %raw, "Discarding unparsable action arguments");
            }
            serde_json::Map::new()
        }
    }
}

#[async_trait]
impl ctxweave_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.actions.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.actions));
        }

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::parse_response(api_response)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

/// Build the configured backend.
///
/// Without `base_url`, each known provider uses its own endpoint. Every
/// backend except `ollama` needs an API key.
pub fn build_from_config(config: &LlmConfig) -> Result<OpenAiCompatProvider, ProviderError> {
    let provider = config.provider.as_str();
    if provider == "ollama" {
        return Ok(OpenAiCompatProvider::ollama(config.base_url.as_deref()));
    }

    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "no API key for '{provider}' (set llm.api_key or CTXWEAVE_API_KEY)"
        ))
    })?;

    match (provider, config.base_url.as_deref()) {
        (_, Some(url)) => Ok(OpenAiCompatProvider::new(provider, url, api_key)),
        ("dashscope", None) => Ok(OpenAiCompatProvider::dashscope(api_key)),
        ("openai", None) => Ok(OpenAiCompatProvider::openai(api_key)),
        (other, None) => Err(ProviderError::NotConfigured(format!(
            "provider '{other}' needs llm.base_url"
        ))),
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxweave_config::ContextConfig;
    use ctxweave_core::Provider;

    #[test]
    fn dashscope_constructor() {
        let provider = OpenAiCompatProvider::dashscope("sk-test");
        assert_eq!(provider.name(), "dashscope");
        assert!(provider.base_url().contains("compatible-mode"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url().contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("custom", "http://host/v1/", "k");
        assert_eq!(provider.base_url(), "http://host/v1");
    }

    #[test]
    fn roles_map_to_openai_names() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("Hello"),
            Message::agent("Hi"),
            Message::action_result("call_1", "2"),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        let roles: Vec<_> = api.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert_eq!(api[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn agent_actions_become_tool_calls() {
        let mut args = serde_json::Map::new();
        args.insert("text".into(), serde_json::json!("hi"));
        let msg = Message::agent_with_actions("", vec![ActionCall::new("call_1", "echo", args)]);

        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        let calls = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "echo");
        assert_eq!(calls[0].function.arguments, r#"{"text":"hi"}"#);
    }

    #[test]
    fn action_definitions_become_tools() {
        let defs = vec![ActionDefinition {
            name: "strlen".into(),
            description: "Count characters".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let tools = OpenAiCompatProvider::to_api_tools(&defs);
        assert_eq!(tools[0].r#type, "function");
        assert_eq!(tools[0].function.name, "strlen");
    }

    #[test]
    fn response_with_tool_calls_parses_into_actions() {
        let data = r#"{
            "model": "qwen-plus",
            "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_a", "type": "function", "function": {"name": "echo", "arguments": "{\"text\":\"hi\"}"}},
                {"id": "call_b", "type": "function", "function": {"name": "strlen", "arguments": "not json"}}
            ]}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let response = OpenAiCompatProvider::parse_response(parsed).unwrap();

        assert_eq!(response.model, "qwen-plus");
        assert_eq!(response.message.role, Role::Agent);
        assert_eq!(response.message.content, "");
        assert_eq!(response.message.actions.len(), 2);
        assert_eq!(response.message.actions[0].arguments["text"], "hi");
        assert!(response.message.actions[1].arguments.is_empty());
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn plain_reply_has_no_actions() {
        let data = r#"{"model":"m","choices":[{"message":{"role":"assistant","content":"Done."}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let response = OpenAiCompatProvider::parse_response(parsed).unwrap();
        assert_eq!(response.message.content, "Done.");
        assert!(!response.message.requests_actions());
    }

    #[test]
    fn empty_choices_is_an_error() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"model":"m","choices":[]}"#).unwrap();
        assert!(OpenAiCompatProvider::parse_response(parsed).is_err());
    }

    #[test]
    fn missing_key_is_not_configured() {
        let config = LlmConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));

        let config = LlmConfig {
            api_key: Some("sk".into()),
            ..LlmConfig::default()
        };
        assert_eq!(build_from_config(&config).unwrap().name(), "dashscope");
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = ContextConfig::from_toml_str("[llm]\nprovider = \"ollama\"\n").unwrap();
        let provider = build_from_config(&config.llm).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn openai_without_url_uses_openai_endpoint() {
        let mut config = ContextConfig::from_toml_str("[llm]\nprovider = \"openai\"\n").unwrap();
        config.apply_overrides(|k| (k == "OPENAI_API_KEY").then(|| "sk-openai".to_string()));
        let provider = build_from_config(&config.llm).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn dashscope_is_the_default_endpoint() {
        let mut config = ContextConfig::default();
        config.llm.api_key = Some("sk".into());
        let provider = build_from_config(&config.llm).unwrap();
        assert_eq!(provider.base_url(), "https://dashscope.aliyuncs.com/compatible-mode/v1");
    }

    #[test]
    fn explicit_url_wins() {
        let config = ContextConfig::from_toml_str(
            "[llm]\nprovider = \"vllm\"\nbase_url = \"http://gpu-box:8000/v1/\"\napi_key = \"k\"\n",
        )
        .unwrap();
        let provider = build_from_config(&config.llm).unwrap();
        assert_eq!(provider.name(), "vllm");
        assert_eq!(provider.base_url(), "http://gpu-box:8000/v1");

        let ollama = ContextConfig::from_toml_str(
            "[llm]\nprovider = \"ollama\"\nbase_url = \"http://box:11434/v1\"\n",
        )
        .unwrap();
        assert_eq!(build_from_config(&ollama.llm).unwrap().base_url(), "http://box:11434/v1");
    }

    #[test]
    fn unknown_provider_without_url_is_not_configured() {
        let config = ContextConfig::from_toml_str(
            "[llm]\nprovider = \"vllm\"\napi_key = \"k\"\n",
        )
        .unwrap();
        let err = build_from_config(&config.llm).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
