//! The application facade: knowledge, turn graph, seed, and checkpoints in one
//! owned value.
//!
//! A turn loads the thread's snapshot, appends the user message, runs the
//! graph on that private copy, and saves the result only if every node
//! succeeded. A failed turn leaves the stored snapshot untouched.

use crate::context::ContextAssembler;
use crate::graph::{TurnGraph, TurnTrace};
use ctxweave_config::{CheckpointBackend, CheckpointConfig, ContextConfig};
use ctxweave_core::action::ActionRegistry;
use ctxweave_core::checkpoint::Checkpointer;
use ctxweave_core::message::Message;
use ctxweave_core::provider::Provider;
use ctxweave_core::session::ThreadId;
use ctxweave_core::state::{ConversationState, SeedState};
use ctxweave_core::{Error, Result};
use ctxweave_store::{FileCheckpointer, IngestError, InMemoryCheckpointer, KnowledgeStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Build the checkpointer selected by configuration.
pub fn build_checkpointer(config: &CheckpointConfig) -> Arc<dyn Checkpointer> {
    match config.backend {
        CheckpointBackend::Memory => Arc::new(InMemoryCheckpointer::new()),
        CheckpointBackend::File => Arc::new(FileCheckpointer::new(&config.dir)),
    }
}

/// The result of one successful turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The final agent message
    pub reply: Message,
    pub trace: TurnTrace,
}

/// A configured knowledge path that could not be ingested.
#[derive(Debug)]
pub struct IngestFailure {
    pub path: String,
    pub error: IngestError,
}

pub struct ContextApp {
    graph: TurnGraph,
    knowledge: Arc<KnowledgeStore>,
    checkpointer: Arc<dyn Checkpointer>,
    seed: SeedState,
    ingest_failures: Vec<IngestFailure>,
}

impl ContextApp {
    pub fn new(
        graph: TurnGraph,
        knowledge: Arc<KnowledgeStore>,
        checkpointer: Arc<dyn Checkpointer>,
        seed: SeedState,
    ) -> Self {
        Self {
            graph,
            knowledge,
            checkpointer,
            seed,
            ingest_failures: Vec::new(),
        }
    }

    /// Build the app from configuration.
    ///
    /// Sticky items are added first, then files, then directories. A path
    /// that fails to ingest is skipped and reported by
    /// [`ContextApp::ingest_failures`].
    pub async fn from_config(
        config: &ContextConfig,
        provider: Arc<dyn Provider>,
        actions: ActionRegistry,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        let mut store = KnowledgeStore::with_keyword_index();
        for item in config.sticky() {
            store.add_sticky(item);
        }
        let mut ingest_failures = Vec::new();
        for file in config.files() {
            let result = store.add_file(&file).await;
            if let Err(error) = result {
                ingest_failures.push(IngestFailure { path: file, error });
            }
        }
        for dir in config.dirs() {
            let result = store.add_dir(&dir).await;
            if let Err(error) = result {
                ingest_failures.push(IngestFailure { path: dir, error });
            }
        }
        let knowledge = Arc::new(store);

        let assembler =
            ContextAssembler::new(knowledge.clone()).with_top_k(config.engine.retrieve_top_k);
        let graph = TurnGraph::new(assembler, provider, Arc::new(actions))
            .with_model(config.llm.model.clone())
            .with_temperature(config.llm.temperature)
            .with_max_tokens(config.llm.max_tokens)
            .with_max_rounds(config.engine.round_limit());

        info!(
            sticky = knowledge.sticky().len(),
            indexed = knowledge.indexed_count().await,
            failed_paths = ingest_failures.len(),
            checkpoint = %checkpointer.name(),
            "Context app ready"
        );

        Self {
            ingest_failures,
            ..Self::new(graph, knowledge, checkpointer, config.seed())
        }
    }

    /// The knowledge store used by every turn.
    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    /// Knowledge paths from the configuration that were skipped.
    pub fn ingest_failures(&self) -> &[IngestFailure] {
        &self.ingest_failures
    }

    /// Apply the configured seed to a thread.
    ///
    /// Overwrites exactly the seeded fields that are present; history is kept.
    pub async fn seed(&self, thread_id: &ThreadId) -> Result<ConversationState> {
        let mut state = self.load_or_default(thread_id).await?;
        state.apply_seed(&self.seed);
        self.checkpointer.save(thread_id, &state).await?;
        debug!(thread_id = %thread_id, "Thread seeded");
        Ok(state)
    }

    /// Run a turn for `text` and return the agent's reply.
    pub async fn send_user_message(&self, thread_id: &ThreadId, text: &str) -> Result<Message> {
        Ok(self.run_turn(thread_id, text).await?.reply)
    }

    /// Run a turn for `text`, returning the reply and the turn trace.
    pub async fn run_turn(&self, thread_id: &ThreadId, text: &str) -> Result<TurnOutcome> {
        info!(thread_id = %thread_id, "Processing user message");

        let mut working = self.load_or_default(thread_id).await?;
        working.push(Message::user(text));

        let trace = self.graph.run(&mut working).await?;
        let reply = working
            .last_message()
            .cloned()
            .ok_or_else(|| Error::Internal("turn finished with empty history".into()))?;

        self.checkpointer.save(thread_id, &working).await?;
        Ok(TurnOutcome { reply, trace })
    }

    /// The stored snapshot for a thread, if any.
    pub async fn get_state(&self, thread_id: &ThreadId) -> Result<Option<ConversationState>> {
        Ok(self.checkpointer.load(thread_id).await?)
    }

    /// Move the thread's procedure cursor forward one step.
    pub async fn advance_procedure(&self, thread_id: &ThreadId) -> Result<usize> {
        self.update(thread_id, |state| Ok(state.advance_procedure()))
            .await
    }

    /// Move the thread's procedure cursor back one step.
    pub async fn rewind_procedure(&self, thread_id: &ThreadId) -> Result<usize> {
        self.update(thread_id, |state| Ok(state.rewind_procedure()))
            .await
    }

    /// Put the thread's procedure cursor on a zero-based step.
    pub async fn set_procedure_step(&self, thread_id: &ThreadId, step: usize) -> Result<()> {
        self.update(thread_id, |state| Ok(state.set_procedure_step(step)?))
            .await
    }

    async fn load_or_default(&self, thread_id: &ThreadId) -> Result<ConversationState> {
        Ok(self
            .checkpointer
            .load(thread_id)
            .await?
            .unwrap_or_default())
    }

    /// Load, modify, and save a thread. Nothing is saved if `f` fails.
    async fn update<T>(
        &self,
        thread_id: &ThreadId,
        f: impl FnOnce(&mut ConversationState) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.load_or_default(thread_id).await?;
        let value = f(&mut state)?;
        self.checkpointer.save(thread_id, &state).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, action_response, text_call, text_response};
    use ctxweave_core::error::TurnError;
    use ctxweave_core::message::Role;

    const CONFIG: &str = r#"
system = "You are a support agent."
sticky_docs = ["always-on rule"]

[context]
policies = ["P1"]
facts = ["F1"]
priority = ["facts", "policies"]

[procedure]
enabled = true
steps = ["step A", "step B"]
"#;

    async fn app(provider: Arc<ScriptedProvider>) -> ContextApp {
        let config = ContextConfig::from_toml_str(CONFIG).unwrap();
        ContextApp::from_config(
            &config,
            provider,
            ActionRegistry::new(),
            Arc::new(InMemoryCheckpointer::new()),
        )
        .await
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn seed_writes_configured_fields() {
        let app = app(Arc::new(ScriptedProvider::new(vec![]))).await;
        let thread = ThreadId::for_user("alice");

        let state = app.seed(&thread).await.unwrap();
        assert_eq!(state.system.as_deref(), Some("You are a support agent."));
        assert_eq!(state.context, strings(&["F1", "P1"]));
        assert!(state.procedure_enabled);
        assert_eq!(state.procedure_step, 0);
        assert!(state.messages.is_empty());

        let stored = app.get_state(&thread).await.unwrap().unwrap();
        assert_eq!(stored, state);
    }

    #[tokio::test]
    async fn turn_folds_sticky_and_saves() {
        let provider = Arc::new(ScriptedProvider::single_text("Hello!"));
        let app = app(provider.clone()).await;
        let thread = ThreadId::for_user("alice");
        app.seed(&thread).await.unwrap();

        let reply = app.send_user_message(&thread, "hi").await.unwrap();
        assert_eq!(reply.content, "Hello!");

        let state = app.get_state(&thread).await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.buckets.policies.as_slice(), &strings(&["P1", "always-on rule"])[..]);
        assert_eq!(state.context, strings(&["F1", "P1", "always-on rule"]));

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].content, "You are a support agent.");
        assert!(request.messages[2].content.contains("step A"));
    }

    #[tokio::test]
    async fn failed_turn_leaves_state_unchanged() {
        let app = app(Arc::new(ScriptedProvider::new(vec![]))).await;
        let thread = ThreadId::for_user("bob");
        let seeded = app.seed(&thread).await.unwrap();

        assert!(app.send_user_message(&thread, "hi").await.is_err());
        assert_eq!(app.get_state(&thread).await.unwrap().unwrap(), seeded);
    }

    #[tokio::test]
    async fn round_limit_failure_leaves_state_unchanged() {
        let provider = Arc::new(ScriptedProvider::always(action_response(vec![text_call(
            "c", "echo", "x",
        )])));
        let config = ContextConfig::from_toml_str("[engine]\nmax_rounds = 2\n").unwrap();
        let mut actions = ActionRegistry::new();
        actions.register(Box::new(EchoAction));
        let app = ContextApp::from_config(
            &config,
            provider,
            actions,
            Arc::new(InMemoryCheckpointer::new()),
        )
        .await;
        let thread = ThreadId::for_user("carol");

        let err = app.send_user_message(&thread, "loop").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Turn(TurnError::RoundLimitExceeded { limit: 2 })
        ));
        assert!(app.get_state(&thread).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn turns_accumulate_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("first"),
            text_response("second"),
        ]));
        let app = app(provider).await;
        let thread = ThreadId::for_user("dave");

        app.send_user_message(&thread, "one").await.unwrap();
        let outcome = app.run_turn(&thread, "two").await.unwrap();
        assert_eq!(outcome.reply.content, "second");
        assert_eq!(outcome.trace.generations, 1);

        let state = app.get_state(&thread).await.unwrap().unwrap();
        let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Agent, Role::User, Role::Agent]);
    }

    #[tokio::test]
    async fn procedure_control_is_manual_and_clamped() {
        let provider = Arc::new(ScriptedProvider::single_text("ok"));
        let app = app(provider).await;
        let thread = ThreadId::for_user("erin");
        app.seed(&thread).await.unwrap();

        app.send_user_message(&thread, "hi").await.unwrap();
        assert_eq!(app.get_state(&thread).await.unwrap().unwrap().procedure_step, 0);

        assert_eq!(app.advance_procedure(&thread).await.unwrap(), 1);
        assert_eq!(app.advance_procedure(&thread).await.unwrap(), 1);
        assert_eq!(app.rewind_procedure(&thread).await.unwrap(), 0);
        assert!(app.set_procedure_step(&thread, 5).await.is_err());
        app.set_procedure_step(&thread, 1).await.unwrap();
        assert_eq!(app.get_state(&thread).await.unwrap().unwrap().procedure_step, 1);
    }

    #[tokio::test]
    async fn failed_knowledge_paths_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        let empty = dir.path().join("empty");
        std::fs::create_dir_all(&good).unwrap();
        std::fs::create_dir_all(&empty).unwrap();
        std::fs::write(good.join("a.md"), "alpha document").unwrap();
        let missing = dir.path().join("missing.md");

        let toml = format!(
            "doc_files = ['{}']\ndoc_dirs = ['{}', '{}']\n",
            missing.display(),
            empty.display(),
            good.display()
        );
        let config = ContextConfig::from_toml_str(&toml).unwrap();
        let app = ContextApp::from_config(
            &config,
            Arc::new(ScriptedProvider::new(vec![])),
            ActionRegistry::new(),
            Arc::new(InMemoryCheckpointer::new()),
        )
        .await;

        let failures = app.ingest_failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].path, missing.display().to_string());
        assert!(matches!(failures[0].error, IngestError::NotFound { .. }));
        assert_eq!(failures[1].path, empty.display().to_string());
        assert!(matches!(failures[1].error, IngestError::EmptyDirectory { .. }));
        assert_eq!(app.knowledge().indexed_count().await, 1);
    }

    #[tokio::test]
    async fn clean_config_has_no_ingest_failures() {
        let app = app(Arc::new(ScriptedProvider::new(vec![]))).await;
        assert!(app.ingest_failures().is_empty());
    }

    #[tokio::test]
    async fn file_checkpointer_persists_across_apps() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = CheckpointConfig {
            backend: CheckpointBackend::File,
            dir: dir.path().display().to_string(),
        };
        let config = ContextConfig::from_toml_str(CONFIG).unwrap();
        let thread = ThreadId::for_user("frank");

        let first = ContextApp::from_config(
            &config,
            Arc::new(ScriptedProvider::single_text("hello")),
            ActionRegistry::new(),
            build_checkpointer(&checkpoint),
        )
        .await;
        first.seed(&thread).await.unwrap();
        first.send_user_message(&thread, "hi").await.unwrap();

        let second = ContextApp::from_config(
            &config,
            Arc::new(ScriptedProvider::new(vec![])),
            ActionRegistry::new(),
            build_checkpointer(&checkpoint),
        )
        .await;
        let state = second.get_state(&thread).await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.last_message().unwrap().content, "hello");
    }

    struct EchoAction;

    #[async_trait::async_trait]
    impl ctxweave_core::action::Action for EchoAction {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo text"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(
            &self,
            arguments: serde_json::Map<String, serde_json::Value>,
        ) -> std::result::Result<serde_json::Value, ctxweave_core::error::ActionError> {
            Ok(arguments.get("text").cloned().unwrap_or_default())
        }
    }
}
