//! Context assembly and rendering.
//!
//! [`ContextAssembler`] updates a thread's buckets before generation.
//! [`effective_messages`] turns the updated state into the exact message list
//! sent to the provider.

pub mod assembler;
pub mod render;

pub use assembler::{ContextAssembler, ContextUpdate, format_retrieved};
pub use render::{CONTEXT_HEADER, effective_messages, render_context_block, render_procedure_guide};
