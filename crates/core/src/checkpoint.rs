//! Checkpointer trait: per-thread persistence of conversation state.
//!
//! The engine loads a thread's latest snapshot at the start of a turn and saves
//! the whole updated snapshot once the turn succeeds. A failed turn never
//! reaches `save`, so the stored state stays exactly as it was.

use crate::error::CheckpointError;
use crate::session::ThreadId;
use crate::state::ConversationState;
use async_trait::async_trait;

/// Opaque key-value store keyed by thread id.
///
/// Implementations: in-memory map, one JSON file per thread.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Load the latest snapshot for a thread, if any.
    async fn load(
        &self,
        thread_id: &ThreadId,
    ) -> std::result::Result<Option<ConversationState>, CheckpointError>;

    /// Replace the snapshot for a thread.
    async fn save(
        &self,
        thread_id: &ThreadId,
        state: &ConversationState,
    ) -> std::result::Result<(), CheckpointError>;
}
