//! The progress-and-result event type.

use crate::errors::{STATUS_OK, STATUS_SERVER_ERROR};
use serde::{Deserialize, Serialize};

/// A single update pushed to the caller.
///
/// Non-terminal events only append text to the stream. A terminal event also
/// commits the response, with `commit_code` as its final status (or no status
/// at all when the code is absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Text appended to the stream. Empty messages append nothing.
    pub message: String,
    /// Whether this event reports a fault.
    #[serde(default)]
    pub is_fault: bool,
    /// Whether this event finalizes the response.
    #[serde(default)]
    pub terminal: bool,
    /// Final status committed by a terminal event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_code: Option<u16>,
    /// When the event was produced (ISO 8601).
    pub timestamp: String,
}

impl StreamEvent {
    fn build(message: impl Into<String>, is_fault: bool, terminal: bool, code: Option<u16>) -> Self {
        Self {
            message: message.into(),
            is_fault,
            terminal,
            commit_code: code,
            timestamp: crate::utils::iso_timestamp(),
        }
    }

    /// A non-terminal progress message.
    #[must_use]
    pub fn progress(message: impl Into<String>) -> Self {
        Self::build(message, false, false, None)
    }

    /// A terminal success committed with status 200.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::build(message, false, true, Some(STATUS_OK))
    }

    /// A terminal fault committed with status 500.
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::build(message, true, true, Some(STATUS_SERVER_ERROR))
    }

    /// A terminal event that ends the stream without a status.
    #[must_use]
    pub fn end(message: impl Into<String>) -> Self {
        Self::build(message, false, true, None)
    }

    /// Returns true if the event carries text.
    #[must_use]
    pub fn has_message(&self) -> bool {
        !self.message.is_empty()
    }
}
