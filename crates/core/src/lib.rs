//! # ctxweave Core
//!
//! Domain types, collaborator traits, and error definitions for the ctxweave
//! context engine. This crate does no I/O: it defines the model that every
//! other crate implements against.
//!
//! ## Collaborators
//!
//! The engine never talks to a concrete backend. It consumes:
//! - [`Provider`]: the generation backend (messages in, agent message out)
//! - [`Retriever`]: the retrieval backend (query in, ranked documents out)
//! - [`ActionRegistry`]: named side-effecting actions the agent may request
//! - [`Checkpointer`]: per-thread persistence of [`ConversationState`]

pub mod action;
pub mod checkpoint;
pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod session;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use action::{Action, ActionDefinition, ActionRegistry, render_output};
pub use checkpoint::Checkpointer;
pub use error::{Error, Result};
pub use message::{ActionCall, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use retrieval::{Document, RetrievedDocument, Retriever};
pub use session::{SessionRegistry, ThreadId};
pub use state::{BucketKind, ContextBuckets, ConversationState, OrderedSet, SeedState};
