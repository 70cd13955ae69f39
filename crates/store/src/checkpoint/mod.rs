//! Thread checkpointers.

pub mod file;
pub mod in_memory;

pub use file::FileCheckpointer;
pub use in_memory::InMemoryCheckpointer;
