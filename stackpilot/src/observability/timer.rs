//! Wall-clock timing of one request.

use std::time::Instant;
use tracing::info;

/// Measures a request from dispatch to completion.
#[derive(Debug)]
pub struct RequestTimer {
    start: Instant,
    intent: &'static str,
}

impl RequestTimer {
    /// Starts timing a request for `intent`.
    #[must_use]
    pub fn start(intent: &'static str) -> Self {
        Self {
            start: Instant::now(),
            intent,
        }
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Logs completion with the committed status, returning the duration.
    pub fn finish(self, status: Option<u16>) -> f64 {
        let duration_ms = self.elapsed_ms();
        match status {
            Some(status) => info!(intent = self.intent, status, duration_ms, "Request finished"),
            None => info!(intent = self.intent, duration_ms, "Request finished without a status"),
        }
        duration_ms
    }
}
