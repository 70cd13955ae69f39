//! Retriever trait: the abstraction over the indexed corpus.
//!
//! The knowledge store asks a Retriever for the top-k documents matching the
//! latest message. The core does not care how matching works (keyword,
//! embeddings, remote service); it only relies on content plus origin metadata.

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key holding the full path of the ingested file.
pub const META_FILE_PATH: &str = "file_path";
/// Metadata key holding the bare file name.
pub const META_FILE_NAME: &str = "file_name";

/// A document handed to a retriever for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A ranked match returned by a retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Relevance score (higher is better)
    #[serde(default)]
    pub score: f32,
}

impl RetrievedDocument {
    /// Where this match came from.
    ///
    /// `None` when the backend attached no metadata at all. Otherwise the file
    /// path, then the file name, then `"unknown"`.
    pub fn origin(&self) -> Option<String> {
        if self.metadata.is_empty() {
            return None;
        }
        let origin = self
            .metadata
            .get(META_FILE_PATH)
            .or_else(|| self.metadata.get(META_FILE_NAME))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        Some(origin)
    }
}

/// The retrieval backend.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// The backend name (e.g., "keyword").
    fn name(&self) -> &str;

    /// Add documents to the corpus. Either all documents are indexed or none are.
    async fn ingest(&self, documents: Vec<Document>) -> std::result::Result<usize, RetrievalError>;

    /// Return up to `top_k` matches for `query`, best first.
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<RetrievedDocument>, RetrievalError>;

    /// Number of indexed units in the corpus.
    async fn count(&self) -> usize;
}
