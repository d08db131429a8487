//! Progress streaming.
//!
//! This module provides the outbound stream every request writes to:
//! - `StreamEvent`, the unit producers emit
//! - `EventChannel`, the task-safe sink with its one-shot commit
//! - `EventStream`, the receiving side drained by the transport
//! - SSE framing for the transport

mod channel;
mod event;
mod guard;
pub mod sse;

pub use channel::{chunks, commits, EventChannel, EventStream, Frame};
pub use event::StreamEvent;
pub use guard::CommitGuard;
