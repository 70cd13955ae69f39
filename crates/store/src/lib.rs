//! Knowledge and persistence backends for ctxweave.
//!
//! - [`KnowledgeStore`]: sticky knowledge plus an indexed corpus behind a [`Retriever`](ctxweave_core::Retriever)
//! - [`KeywordIndex`]: the built-in lexical retriever
//! - [`InMemoryCheckpointer`] / [`FileCheckpointer`]: per-thread state snapshots

pub mod checkpoint;
pub mod index;
pub mod knowledge;

pub use checkpoint::{FileCheckpointer, InMemoryCheckpointer};
pub use index::{KeywordIndex, chunk_text};
pub use knowledge::{IngestError, KnowledgeStore};
