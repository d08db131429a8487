//! Cleanup steps that run however an operation ends.

use crate::errors::StackResult;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

struct CleanupStep {
    name: String,
    action: BoxFuture<'static, StackResult<()>>,
}

/// Named async cleanup steps, run once in LIFO order.
#[derive(Default)]
pub struct CleanupRegistry {
    steps: Mutex<Vec<CleanupStep>>,
}

impl CleanupRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a step.
    pub fn register<F>(&self, name: impl Into<String>, action: F)
    where
        F: Future<Output = StackResult<()>> + Send + 'static,
    {
        self.steps.lock().push(CleanupStep {
            name: name.into(),
            action: Box::pin(action),
        });
    }

    /// Number of steps not yet run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.steps.lock().len()
    }

    /// Runs every step, newest first, each bounded by `timeout`.
    ///
    /// A failing or timed-out step does not stop the rest. Returns the
    /// `(name, reason)` of each step that did not succeed. The registry is
    /// empty afterwards, so a second call runs nothing.
    pub async fn run_all(&self, timeout: Duration) -> Vec<(String, String)> {
        let steps = std::mem::take(&mut *self.steps.lock());
        let mut failures = Vec::new();

        for step in steps.into_iter().rev() {
            match tokio::time::timeout(timeout, step.action).await {
                Ok(Ok(())) => debug!(step = %step.name, "Cleanup step done"),
                Ok(Err(err)) => {
                    warn!(step = %step.name, error = %err, "Cleanup step failed");
                    failures.push((step.name, err.to_string()));
                }
                Err(_) => {
                    warn!(step = %step.name, timeout_ms = timeout.as_millis() as u64, "Cleanup step timed out");
                    failures.push((step.name, "timed out".to_string()));
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

/// Runs `operation`, then always runs `cleanup` bounded by `timeout`, and
/// returns the operation's result.
pub async fn run_with_cleanup<T, E, Fut, C, CFut>(
    operation: Fut,
    cleanup: C,
    timeout: Duration,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    C: FnOnce() -> CFut,
    CFut: Future<Output = ()>,
{
    let result = operation.await;
    if tokio::time::timeout(timeout, cleanup()).await.is_err() {
        warn!(timeout_ms = timeout.as_millis() as u64, "Cleanup timed out");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StackError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lifo_order() {
        let registry = CleanupRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 1..=3 {
            let order = order.clone();
            registry.register(format!("step-{i}"), async move {
                order.lock().push(i);
                Ok(())
            });
        }
        assert_eq!(registry.pending_count(), 3);

        let failures = registry.run_all(Duration::from_secs(1)).await;
        assert!(failures.is_empty());
        assert_eq!(*order.lock(), vec![3, 2, 1]);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_steps() {
        let registry = CleanupRegistry::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = ran.clone();
        registry.register("first", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        registry.register("fails", async { Err(StackError::Configuration("boom".into())) });
        registry.register("hangs", futures::future::pending());

        let failures = registry.run_all(Duration::from_millis(20)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        let names: Vec<_> = failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["hangs", "fails"]);
    }

    #[tokio::test]
    async fn test_run_all_twice_runs_once() {
        let registry = CleanupRegistry::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        registry.register("once", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        registry.run_all(Duration::from_secs(1)).await;
        registry.run_all(Duration::from_secs(1)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_with_cleanup_returns_operation_result() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let counter = cleaned.clone();
        let result: Result<(), &str> = run_with_cleanup(
            async { Err("failed") },
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(result, Err("failed"));
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }
}
