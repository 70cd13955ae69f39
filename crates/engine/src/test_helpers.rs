//! Shared test helpers for engine tests.

use ctxweave_core::error::ProviderError;
use ctxweave_core::message::{ActionCall, Message};
use ctxweave_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;

/// A provider that replays scripted responses and records every request.
///
/// Each call to `complete` returns the next response in the script. Once the
/// script is exhausted, calls fail with a network error unless the provider
/// was built with [`ScriptedProvider::always`].
pub struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    repeat_last: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the same response on every call.
    pub fn always(response: ProviderResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![response])
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };

        let responses = self.responses.lock().unwrap();
        match responses.get(call) {
            Some(response) => Ok(response.clone()),
            None if self.repeat_last && !responses.is_empty() => {
                Ok(responses[responses.len() - 1].clone())
            }
            None => Err(ProviderError::Network(format!(
                "script exhausted (call #{call}, have {})",
                responses.len()
            ))),
        }
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A plain reply with no requested actions.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::agent(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A reply requesting the given actions.
pub fn action_response(actions: Vec<ActionCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::agent_with_actions("", actions),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// An action call with a single `text` argument.
pub fn text_call(id: &str, name: &str, text: &str) -> ActionCall {
    let mut arguments = serde_json::Map::new();
    arguments.insert("text".into(), serde_json::Value::String(text.into()));
    ActionCall::new(id, name, arguments)
}
