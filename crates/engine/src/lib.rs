//! The ctxweave turn engine.
//!
//! A turn runs a small state machine over one thread's [`ConversationState`]:
//!
//! 1. **prepare_ctx**: fold sticky knowledge into policies and retrieved
//!    knowledge into facts, then rebuild the merged context
//! 2. **chat_llm**: render the effective messages and call the provider once
//! 3. **run_tools**: if the reply requested actions, run them, append their
//!    results, and go back to 2
//! 4. **end**: the latest message is the reply
//!
//! [`ContextApp`] wraps the graph with seeding, checkpointing, and
//! procedure control.
//!
//! [`ConversationState`]: ctxweave_core::ConversationState

pub mod context;
pub mod graph;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ContextAssembler, ContextUpdate, effective_messages, format_retrieved};
pub use graph::{Node, TurnGraph, TurnTrace};
pub use runtime::{ContextApp, IngestFailure, TurnOutcome, build_checkpointer};
