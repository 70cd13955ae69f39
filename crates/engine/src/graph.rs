//! The turn state machine.
//!
//! ```text
//! prepare_ctx ──▶ chat_llm ──▶ end
//!                   ▲   │
//!                   │   ▼ (reply requested actions)
//!                 run_tools
//! ```
//!
//! Each node is a method that mutates the working state and returns the next
//! node. The generation-round guard caps the number of `chat_llm` passes per
//! turn.

use crate::context::{ContextAssembler, effective_messages};
use ctxweave_core::action::{ActionRegistry, render_output};
use ctxweave_core::error::TurnError;
use ctxweave_core::message::Message;
use ctxweave_core::provider::{Provider, ProviderRequest};
use ctxweave_core::state::ConversationState;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default cap on generation passes per turn.
pub const DEFAULT_MAX_ROUNDS: u32 = 25;

/// A state of the turn machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    PrepareCtx,
    ChatLlm,
    RunTools,
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrepareCtx => "prepare_ctx",
            Self::ChatLlm => "chat_llm",
            Self::RunTools => "run_tools",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one turn did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnTrace {
    /// Nodes in visiting order, ending with [`Node::End`]
    pub visited: Vec<Node>,
    /// Number of `chat_llm` passes
    pub generations: u32,
    /// Number of actions invoked (failed invocations included)
    pub actions_executed: usize,
    /// Requested actions with no registered handler
    pub actions_skipped: usize,
}

/// Edge out of `chat_llm`.
pub fn route_after_generation(state: &ConversationState) -> Node {
    match state.last_message() {
        Some(message) if message.requests_actions() => Node::RunTools,
        _ => Node::End,
    }
}

/// Sequences context assembly, generation, and action execution for a turn.
pub struct TurnGraph {
    assembler: ContextAssembler,
    provider: Arc<dyn Provider>,
    actions: Arc<ActionRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_rounds: Option<u32>,
}

impl TurnGraph {
    pub fn new(
        assembler: ContextAssembler,
        provider: Arc<dyn Provider>,
        actions: Arc<ActionRegistry>,
    ) -> Self {
        Self {
            assembler,
            provider,
            actions,
            model: "qwen-plus".into(),
            temperature: 0.7,
            max_tokens: None,
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Cap generation passes per turn. `None` removes the cap.
    pub fn with_max_rounds(mut self, max_rounds: Option<u32>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Run one full turn over `state`.
    ///
    /// On error `state` may hold partial progress; callers that need an
    /// atomic turn run it on a copy.
    pub async fn run(&self, state: &mut ConversationState) -> ctxweave_core::Result<TurnTrace> {
        let mut trace = TurnTrace::default();
        let mut node = Node::PrepareCtx;

        loop {
            trace.visited.push(node);
            debug!(node = %node, "Entering node");
            node = match node {
                Node::PrepareCtx => {
                    self.prepare_ctx(state).await?;
                    Node::ChatLlm
                }
                Node::ChatLlm => {
                    self.chat_llm(state, &mut trace).await?;
                    route_after_generation(state)
                }
                Node::RunTools => {
                    self.run_tools(state, &mut trace).await;
                    Node::ChatLlm
                }
                Node::End => break,
            };
        }

        info!(
            generations = trace.generations,
            actions = trace.actions_executed,
            "Turn complete"
        );
        Ok(trace)
    }

    async fn prepare_ctx(&self, state: &mut ConversationState) -> Result<(), TurnError> {
        let update = self.assembler.prepare(state).await?;
        update.apply(state);
        Ok(())
    }

    async fn chat_llm(
        &self,
        state: &mut ConversationState,
        trace: &mut TurnTrace,
    ) -> ctxweave_core::Result<()> {
        if let Some(limit) = self.max_rounds {
            if trace.generations >= limit {
                warn!(limit, "Generation round limit reached");
                return Err(TurnError::RoundLimitExceeded { limit }.into());
            }
        }
        trace.generations += 1;

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: effective_messages(state),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            actions: self.actions.definitions(),
        };

        let response = self.provider.complete(request).await?;
        debug!(
            provider = %self.provider.name(),
            model = %response.model,
            round = trace.generations,
            actions = response.message.actions.len(),
            "Generation complete"
        );

        let mut message = response.message;
        // History records every generated reply as the agent's.
        message.role = ctxweave_core::Role::Agent;
        state.push(message);
        Ok(())
    }

    async fn run_tools(&self, state: &mut ConversationState, trace: &mut TurnTrace) {
        let calls = match state.last_message() {
            Some(message) => message.actions.clone(),
            None => return,
        };

        for call in &calls {
            if self.actions.get(&call.name).is_none() {
                debug!(action = %call.name, "No action registered under this name, skipping");
                trace.actions_skipped += 1;
                continue;
            }

            let content = match self.actions.invoke(call).await {
                Ok(output) => render_output(&output),
                Err(e) => {
                    warn!(action = %call.name, error = %e, "Action execution failed");
                    format!("Error executing action: {e}")
                }
            };
            trace.actions_executed += 1;
            state.push(Message::action_result(&call.id, content));
        }
    }
}
