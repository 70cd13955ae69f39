//! File checkpointer: one pretty-printed JSON document per thread.
//!
//! Layout: `<dir>/<escaped thread id>.json`. Characters outside
//! `[A-Za-z0-9_-]` are percent-escaped, so `u:alice` is stored as
//! `u%3Aalice.json`. Writes go to a temporary sibling that is then renamed
//! into place.

use async_trait::async_trait;
use ctxweave_core::checkpoint::Checkpointer;
use ctxweave_core::error::CheckpointError;
use ctxweave_core::session::ThreadId;
use ctxweave_core::state::ConversationState;
use std::path::PathBuf;
use tracing::debug;

pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The snapshot path for a thread.
    pub fn path_for(&self, thread_id: &ThreadId) -> PathBuf {
        self.dir.join(format!("{}.json", escape(thread_id.as_str())))
    }
}

fn escape(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Option<ConversationState>, CheckpointError> {
        let path = self.path_for(thread_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CheckpointError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let state = serde_json::from_str(&content).map_err(|e| CheckpointError::Corrupted {
            thread_id: thread_id.to_string(),
            reason: e.to_string(),
        })?;
        debug!(thread_id = %thread_id, path = %path.display(), "Loaded checkpoint");
        Ok(Some(state))
    }

    async fn save(&self, thread_id: &ThreadId, state: &ConversationState) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            CheckpointError::Storage(format!("Failed to create checkpoint directory: {e}"))
        })?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| CheckpointError::Storage(format!("Failed to serialize state: {e}")))?;

        let path = self.path_for(thread_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to replace {}: {e}", path.display())))?;

        debug!(thread_id = %thread_id, path = %path.display(), "Saved checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxweave_core::message::Message;

    #[test]
    fn thread_ids_are_escaped() {
        let cp = FileCheckpointer::new("/tmp/threads");
        assert_eq!(
            cp.path_for(&ThreadId::for_user("alice")),
            PathBuf::from("/tmp/threads/u%3Aalice.json")
        );
        assert_eq!(escape("../etc"), "%2E%2E%2Fetc");
    }

    #[tokio::test]
    async fn roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cp = FileCheckpointer::new(dir.path().join("threads"));
        let thread = ThreadId::for_user("bob");

        assert!(cp.load(&thread).await.unwrap().is_none());

        let mut state = ConversationState::new();
        state.system = Some("Be brief.".into());
        state.buckets.facts.insert("F1");
        state.recompute_context();
        state.push(Message::user("hello"));
        cp.save(&thread, &state).await.unwrap();

        let loaded = cp.load(&thread).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!cp.path_for(&thread).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupted_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cp = FileCheckpointer::new(dir.path());
        let thread = ThreadId::new("t1");
        std::fs::write(cp.path_for(&thread), "{ not json").unwrap();

        let err = cp.load(&thread).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupted { .. }));
    }
}
