//! Session registry: maps external user ids to conversation threads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a single persistent conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The namespaced thread id for an external user.
    pub fn for_user(user_id: &str) -> Self {
        Self(format!("u:{user_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lazily assigns a stable thread to each user for the life of the process.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    threads: HashMap<String, ThreadId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the thread for `user_id`, creating it on first contact.
    pub fn thread_for(&mut self, user_id: &str) -> ThreadId {
        self.threads
            .entry(user_id.to_string())
            .or_insert_with(|| ThreadId::for_user(user_id))
            .clone()
    }

    /// Number of users seen so far.
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
