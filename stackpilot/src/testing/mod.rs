//! Test doubles for the stack and the retrieval collaborators.
//!
//! - [`ScriptedCompose`] scripts compose results and records calls
//! - [`HashEmbeddingModel`] embeds deterministically without a server
//! - [`ScriptedBackendBuilder`] fails a chosen pipeline step on demand
//! - [`TestCollaborators`] wires them into a pipeline

mod compose;
mod rag;

pub use compose::{ComposeCall, ScriptedCompose};
pub use rag::{HashEmbeddingModel, ScriptedBackendBuilder, TestCollaborators};
