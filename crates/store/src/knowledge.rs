//! Knowledge store: sticky knowledge plus an indexed corpus.
//!
//! Sticky items are included in every turn. Indexed content is only surfaced
//! when a turn's query matches it. Ingestion and sticky mutation happen while
//! the app is being built; turns only read.

use crate::index::KeywordIndex;
use ctxweave_core::error::RetrievalError;
use ctxweave_core::retrieval::{
    Document, META_FILE_NAME, META_FILE_PATH, RetrievedDocument, Retriever,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Errors raised while adding files or directories to the corpus.
///
/// The corpus is unchanged whenever one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("No readable documents under {path}")]
    EmptyDirectory { path: PathBuf },

    #[error(transparent)]
    Index(#[from] RetrievalError),
}

impl From<IngestError> for ctxweave_core::Error {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Index(inner) => ctxweave_core::Error::Retrieval(inner),
            other => ctxweave_core::Error::Retrieval(RetrievalError::IngestFailed(other.to_string())),
        }
    }
}

pub struct KnowledgeStore {
    sticky: Vec<String>,
    retriever: Arc<dyn Retriever>,
}

impl KnowledgeStore {
    /// A store backed by the given retriever.
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            sticky: Vec::new(),
            retriever,
        }
    }

    /// A store backed by a fresh [`KeywordIndex`].
    pub fn with_keyword_index() -> Self {
        Self::new(Arc::new(KeywordIndex::new()))
    }

    /// Append a sticky item. Duplicates are kept.
    pub fn add_sticky(&mut self, text: impl Into<String>) {
        self.sticky.push(text.into());
    }

    pub fn sticky(&self) -> &[String] {
        &self.sticky
    }

    /// Number of indexed units in the corpus.
    pub async fn indexed_count(&self) -> usize {
        self.retriever.count().await
    }

    /// Ingest a single file.
    pub async fn add_file(&self, path: impl AsRef<Path>) -> Result<usize, IngestError> {
        let path = path.as_ref();
        let result: Result<usize, IngestError> = async {
            if !path.is_file() {
                return Err(IngestError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            let doc = read_document(path).await?.ok_or_else(|| IngestError::Read {
                path: path.to_path_buf(),
                reason: "not valid UTF-8 text".into(),
            })?;
            Ok(self.retriever.ingest(vec![doc]).await?)
        }
        .await;

        log_ingest("file", path, &result);
        result
    }

    /// Ingest every non-hidden text file under a directory, recursively.
    ///
    /// Files that are not valid UTF-8 are skipped. Any other read failure
    /// aborts the whole directory.
    pub async fn add_dir(&self, path: impl AsRef<Path>) -> Result<usize, IngestError> {
        let path = path.as_ref();
        let result: Result<usize, IngestError> = async {
            if !path.is_dir() {
                return Err(IngestError::NotFound {
                    path: path.to_path_buf(),
                });
            }

            let mut docs = Vec::new();
            for file in collect_files(path)? {
                match read_document(&file).await? {
                    Some(doc) => docs.push(doc),
                    None => debug!(path = %file.display(), "Skipping non-text file"),
                }
            }

            if docs.is_empty() {
                return Err(IngestError::EmptyDirectory {
                    path: path.to_path_buf(),
                });
            }
            Ok(self.retriever.ingest(docs).await?)
        }
        .await;

        log_ingest("dir", path, &result);
        result
    }

    /// Top-`top_k` matches for `query`. Backend failures yield an empty list.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Vec<RetrievedDocument> {
        match self.retriever.retrieve(query, top_k).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(retriever = %self.retriever.name(), error = %e, "Retrieval failed, continuing without results");
                Vec::new()
            }
        }
    }
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::with_keyword_index()
    }
}

fn log_ingest(kind: &str, path: &Path, result: &Result<usize, IngestError>) {
    match result {
        Ok(chunks) => info!(kind, path = %path.display(), chunks, "Ingested knowledge"),
        Err(e) => warn!(kind, path = %path.display(), error = %e, "Ingestion failed, corpus unchanged"),
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(|e| IngestError::Read {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Read a file as a document. `None` when the file is not UTF-8 text.
async fn read_document(path: &Path) -> Result<Option<Document>, IngestError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => return Ok(None),
        Err(e) => {
            return Err(IngestError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let mut doc = Document::new(content).with_metadata(META_FILE_PATH, path.display().to_string());
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        doc = doc.with_metadata(META_FILE_NAME, name);
    }
    Ok(Some(doc))
}
