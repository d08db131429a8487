//! # Stackpilot
//!
//! Lifecycle and streaming orchestration for an on-demand database and
//! inference stack defined by a compose file.
//!
//! Stackpilot provides:
//!
//! - **Lifecycle control**: start and stop the stack, poll its health and
//!   tail its logs concurrently
//! - **Streaming progress**: every request streams progress over a single
//!   [`EventChannel`](events::EventChannel) that commits exactly once
//! - **Provisioning**: reserve a model, build a retrieval backend over a
//!   document, answer a query, and always release what was acquired
//! - **Error classification**: faults that are expected in the configured
//!   environment are kept out of the logs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stackpilot::prelude::*;
//!
//! let config = StackConfig::from_env()?;
//! let handler = StackHandler::from_config(config);
//!
//! let dispatched = handler.handle("POST", &Default::default())?;
//! for frame in dispatched.stream.collect_frames().await {
//!     print!("{}", stackpilot::events::sse::encode(&frame));
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod classifier;
pub mod cleanup;
pub mod compose;
pub mod config;
pub mod errors;
pub mod events;
pub mod handler;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod rag;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classifier::ErrorClassifier;
    pub use crate::cleanup::{run_with_cleanup, CleanupRegistry};
    pub use crate::compose::{ComposeRunner, ProcessCompose};
    pub use crate::config::StackConfig;
    pub use crate::errors::{
        PipelineStep, ProcessFault, RequestError, StackError, StackResult,
    };
    pub use crate::events::{EventChannel, EventStream, Frame, StreamEvent};
    pub use crate::handler::{Dispatched, StackHandler, StackIntent, StackRequest};
    pub use crate::health::{HealthStatus, PollPolicy};
    pub use crate::lifecycle::{LifecycleController, ProbeOutcome};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{ModelRuntime, PipelineOutcome, ProvisionPipeline, ProvisionRequest};
    pub use crate::rag::{
        Collaborators, DocumentSource, InferenceModel, MetadataStore, RagBackend,
        RagBackendBuilder, VectorStore,
    };
    pub use crate::utils::{generate_uuid, iso_timestamp};
}
