//! In-memory checkpointer: snapshots live for the life of the process.

use async_trait::async_trait;
use ctxweave_core::checkpoint::Checkpointer;
use ctxweave_core::error::CheckpointError;
use ctxweave_core::session::ThreadId;
use ctxweave_core::state::ConversationState;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryCheckpointer {
    threads: RwLock<HashMap<ThreadId, ConversationState>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with a saved snapshot.
    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Option<ConversationState>, CheckpointError> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &ThreadId, state: &ConversationState) -> Result<(), CheckpointError> {
        self.threads
            .write()
            .await
            .insert(thread_id.clone(), state.clone());
        Ok(())
    }
}
