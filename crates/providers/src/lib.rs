//! Generation backends for ctxweave.
//!
//! All backends implement the `ctxweave_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::{OpenAiCompatProvider, build_from_config};
