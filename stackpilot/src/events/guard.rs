//! One-shot guard for the response commit.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A guard that can be consumed exactly once.
///
/// Consumption is idempotent: only the first caller wins, and only the first
/// status is kept.
#[derive(Default)]
pub struct CommitGuard {
    /// Whether the guard has been consumed.
    consumed: AtomicBool,
    /// The status recorded by the winning commit.
    code: RwLock<Option<u16>>,
}

impl CommitGuard {
    /// Creates a fresh guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the guard, recording `code`.
    ///
    /// Returns true only for the first call.
    pub fn try_consume(&self, code: Option<u16>) -> bool {
        if self
            .consumed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.code.write() = code;
            true
        } else {
            false
        }
    }

    /// Returns whether the guard has been consumed.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Returns the status recorded by the winning commit.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        *self.code.read()
    }
}

impl std::fmt::Debug for CommitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitGuard")
            .field("consumed", &self.is_consumed())
            .field("code", &self.code())
            .finish()
    }
}
