//! Start and stop of the backing stack, with health supervision and log tailing.

use crate::classifier::ErrorClassifier;
use crate::compose::ComposeRunner;
use crate::config::StackConfig;
use crate::errors::{StackError, StackResult};
use crate::events::{EventChannel, StreamEvent};
use crate::health::{HealthStatus, PollPolicy};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const STARTED: &str = "DB and Ollama started";
const STARTING: &str = "DB Starting..";
const START_IN_PROGRESS: &str = "DB startup in progress..";
const START_FAILED: &str = "DB and Ollama start failed";
const STOPPED: &str = "DB and Ollama stopped";
const STOP_FAILED: &str = "DB and Ollama stop failed";

/// How a health probe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The stack reported healthy after `attempts` polls.
    Healthy {
        /// Polls performed.
        attempts: usize,
    },
    /// A poll failed after `attempts` polls.
    Faulted {
        /// Polls performed.
        attempts: usize,
    },
    /// The budget ran out without a healthy report. Nothing terminal was
    /// emitted.
    Exhausted,
}

/// Starts, stops and supervises the backing stack.
pub struct LifecycleController {
    config: Arc<StackConfig>,
    compose: Arc<dyn ComposeRunner>,
    classifier: ErrorClassifier,
}

impl LifecycleController {
    /// Creates a controller.
    #[must_use]
    pub fn new(config: Arc<StackConfig>, compose: Arc<dyn ComposeRunner>) -> Self {
        let classifier = ErrorClassifier::from_config(&config);
        Self {
            config,
            compose,
            classifier,
        }
    }

    fn services(&self) -> Vec<String> {
        vec![
            self.config.db_service.clone(),
            self.config.inference_service.clone(),
        ]
    }

    fn policy(&self, attempts: usize) -> PollPolicy {
        PollPolicy::new(attempts, self.config.poll_delay)
    }

    /// Reports a fault: logged unless benign, always committed.
    fn report_fault(&self, message: &str, err: &StackError, channel: &EventChannel) {
        self.classifier.log_unless_benign(message, err);
        channel.emit(StreamEvent::fault(message));
    }

    /// Brings the stack up.
    ///
    /// The start action is issued immediately. A single-attempt probe runs
    /// first; the log tail then runs alongside the start action, together
    /// with the long probe unless the first probe already settled. Returns
    /// the outcome of the last probe, or the log tail's error.
    pub async fn start(&self, channel: &EventChannel) -> StackResult<ProbeOutcome> {
        info!(dir = %self.config.working_dir.display(), exe = %self.config.executable, "Starting stack");
        let (finished_tx, finished_rx) = watch::channel(0usize);
        let mark_finished = || finished_tx.send_modify(|n| *n += 1);

        let bring_up = async {
            self.bring_up(channel).await;
            mark_finished();
        };

        let supervise = async {
            let initial = self.poll_health(self.policy(1), channel).await;

            let probe = async {
                let outcome = match initial {
                    ProbeOutcome::Exhausted => {
                        self.poll_health(self.policy(self.config.start_probe_attempts), channel)
                            .await
                    }
                    settled => settled,
                };
                mark_finished();
                outcome
            };
            let release = release_when(channel.clone(), finished_rx, 2);
            let (outcome, tailed) = tokio::join!(probe, self.tail_logs(channel, release));
            tailed.map(|()| outcome)
        };

        let ((), result) = tokio::join!(bring_up, supervise);
        if matches!(result, Ok(ProbeOutcome::Exhausted)) && !channel.is_committed() {
            warn!("Health probe budget exhausted without a healthy report; stream ends without a status");
        }
        result
    }

    /// Tears the stack down, tailing logs until the teardown completes.
    pub async fn stop(&self, channel: &EventChannel) -> StackResult<()> {
        info!(dir = %self.config.working_dir.display(), exe = %self.config.executable, "Stopping stack");
        let (finished_tx, finished_rx) = watch::channel(0usize);

        let teardown = async {
            match self.compose.down(channel).await {
                Ok(()) => {
                    channel.emit(StreamEvent::success(STOPPED));
                }
                Err(err) => self.report_fault(STOP_FAILED, &err, channel),
            }
            finished_tx.send_modify(|n| *n += 1);
        };
        let release = release_when(channel.clone(), finished_rx, 1);

        let ((), tailed) = tokio::join!(teardown, self.tail_logs(channel, release));
        tailed
    }

    async fn bring_up(&self, channel: &EventChannel) {
        match self.compose.up(channel).await {
            Ok(()) => {
                channel.emit(StreamEvent::progress(START_IN_PROGRESS));
            }
            Err(err) => self.report_fault(START_FAILED, &err, channel),
        }
    }

    /// Polls the database health under `policy`.
    ///
    /// Healthy commits success and stops at once. A recognized non-healthy
    /// state emits progress and keeps polling. A failed poll commits a fault
    /// and stops.
    pub async fn poll_health(&self, policy: PollPolicy, channel: &EventChannel) -> ProbeOutcome {
        let mut attempts = 0;
        while attempts < policy.max_attempts {
            attempts += 1;
            let report = self.compose.ps(&self.config.db_service).await;
            match report.and_then(|out| HealthStatus::from_report(&out)) {
                Ok(HealthStatus::Healthy) => {
                    channel.emit(StreamEvent::success(STARTED));
                    return ProbeOutcome::Healthy { attempts };
                }
                Ok(status) if status.is_recognized() => {
                    debug!(attempt = attempts, %status, "Stack not healthy yet");
                    channel.emit(StreamEvent::progress(STARTING));
                }
                Ok(status) => {
                    debug!(attempt = attempts, %status, "No status report yet");
                }
                Err(err) => {
                    self.report_fault(START_FAILED, &err, channel);
                    return ProbeOutcome::Faulted { attempts };
                }
            }
            tokio::time::sleep(policy.delay).await;
        }
        ProbeOutcome::Exhausted
    }

    async fn tail_logs(
        &self,
        channel: &EventChannel,
        release: futures::future::BoxFuture<'static, ()>,
    ) -> StackResult<()> {
        self.compose
            .follow_logs(&self.services(), channel, release)
            .await
    }
}

/// Resolves once the response is committed or `count` sibling tasks finished.
fn release_when(
    channel: EventChannel,
    mut finished: watch::Receiver<usize>,
    count: usize,
) -> futures::future::BoxFuture<'static, ()> {
    async move {
        tokio::select! {
            () = channel.committed() => {}
            _ = finished.wait_for(|n| *n >= count) => {}
        }
    }
    .boxed()
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("config", &self.config)
            .field("classifier", &self.classifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProcessFault;
    use crate::events::{chunks, commits, Frame};
    use crate::testing::{ComposeCall, ScriptedCompose};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const HEALTHY: &str = r#"{"State":"running","Health":"healthy"}"#;
    const STARTING_REPORT: &str = r#"{"State":"running","Health":"starting"}"#;

    fn controller(compose: Arc<ScriptedCompose>, attempts: usize) -> LifecycleController {
        let config = StackConfig::new("/srv/stack")
            .with_poll_delay(Duration::from_millis(1))
            .with_start_probe_attempts(attempts);
        LifecycleController::new(Arc::new(config), compose)
    }

    async fn run_start(compose: Arc<ScriptedCompose>, attempts: usize) -> (StackResult<ProbeOutcome>, Vec<Frame>) {
        let controller = controller(compose, attempts);
        let (channel, stream) = EventChannel::new();
        let result = controller.start(&channel).await;
        drop(channel);
        (result, stream.collect_frames().await)
    }

    #[tokio::test]
    async fn test_start_healthy_commits_once_and_stops_polling() {
        let compose = Arc::new(
            ScriptedCompose::new().with_health_reports(vec![
                Ok(STARTING_REPORT.into()),
                Ok(STARTING_REPORT.into()),
                Ok(HEALTHY.into()),
                Ok(HEALTHY.into()),
            ]),
        );
        let (result, frames) = run_start(compose.clone(), 20).await;

        assert_eq!(result.unwrap(), ProbeOutcome::Healthy { attempts: 2 });
        assert_eq!(commits(&frames), vec![(Some(200), STARTED.to_string())]);
        // One initial probe plus two long-probe polls; nothing after healthy.
        assert_eq!(compose.count(|c| matches!(c, ComposeCall::Ps(_))), 3);
    }

    #[tokio::test]
    async fn test_start_initial_healthy_skips_long_probe() {
        let compose = Arc::new(ScriptedCompose::new().with_default_health(HEALTHY));
        let (result, frames) = run_start(compose.clone(), 20).await;

        assert_eq!(result.unwrap(), ProbeOutcome::Healthy { attempts: 1 });
        assert_eq!(commits(&frames), vec![(Some(200), STARTED.to_string())]);
        assert_eq!(compose.count(|c| matches!(c, ComposeCall::Ps(_))), 1);
    }

    #[tokio::test]
    async fn test_start_initial_poll_failure_skips_long_probe() {
        let compose = Arc::new(
            ScriptedCompose::new()
                .with_health_reports(vec![Err(StackError::HealthCheck("ps failed".into()))])
                .with_default_health(STARTING_REPORT),
        );
        let (result, frames) = run_start(compose.clone(), 20).await;

        assert_eq!(result.unwrap(), ProbeOutcome::Faulted { attempts: 1 });
        assert_eq!(commits(&frames), vec![(Some(500), START_FAILED.to_string())]);
        assert_eq!(compose.count(|c| matches!(c, ComposeCall::Ps(_))), 1);
    }

    #[tokio::test]
    async fn test_start_bring_up_failure_commits_single_fault() {
        let compose = Arc::new(
            ScriptedCompose::new()
                .with_up_result(Err(ProcessFault::Exited {
                    command: "podman compose up -d".into(),
                    exit_code: 125,
                    stderr: "image not found".into(),
                }))
                .with_health_reports(vec![
                    Ok(STARTING_REPORT.into()),
                    Err(StackError::HealthCheck("ps failed".into())),
                ]),
        );
        let (result, frames) = run_start(compose, 5).await;

        assert!(result.is_ok());
        let committed = commits(&frames);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].0, Some(500));
    }

    #[tokio::test]
    async fn test_start_poll_failure_commits_fault() {
        let compose = Arc::new(ScriptedCompose::new().with_health_reports(vec![
            Ok(STARTING_REPORT.into()),
            Ok("{\"Health\": ".into()),
        ]));
        let (result, frames) = run_start(compose, 5).await;

        assert_eq!(result.unwrap(), ProbeOutcome::Faulted { attempts: 1 });
        assert_eq!(commits(&frames), vec![(Some(500), START_FAILED.to_string())]);
    }

    #[tokio::test]
    async fn test_start_exhausted_budget_ends_without_commit() {
        let compose = Arc::new(ScriptedCompose::new().with_default_health(STARTING_REPORT));
        let (result, frames) = run_start(compose.clone(), 3).await;

        assert_eq!(result.unwrap(), ProbeOutcome::Exhausted);
        assert!(commits(&frames).is_empty());
        assert_eq!(chunks(&frames).last().map(String::as_str), Some(STARTING));
        assert_eq!(compose.count(|c| matches!(c, ComposeCall::Ps(_))), 4);
    }

    #[tokio::test]
    async fn test_start_streams_logs_and_progress() {
        let compose = Arc::new(
            ScriptedCompose::new()
                .with_log_lines(vec!["db-1 | DATABASE IS READY TO USE!\n".into()])
                .with_health_reports(vec![
                    Ok(String::new()),
                    Ok(STARTING_REPORT.into()),
                    Ok(HEALTHY.into()),
                ]),
        );
        let (result, frames) = run_start(compose.clone(), 20).await;

        assert!(result.is_ok());
        let text = chunks(&frames);
        assert!(text.iter().any(|c| c.contains("DATABASE IS READY")));
        assert!(compose.calls().contains(&ComposeCall::Logs(vec!["db".into(), "ollama".into()])));
    }

    #[tokio::test]
    async fn test_start_log_failure_is_returned() {
        let compose = Arc::new(
            ScriptedCompose::new()
                .with_logs_result(Err(ProcessFault::NotFound {
                    program: "podman".into(),
                }))
                .with_default_health(HEALTHY),
        );
        let (result, frames) = run_start(compose, 20).await;

        assert!(matches!(result, Err(StackError::Process(ProcessFault::NotFound { .. }))));
        assert_eq!(commits(&frames).len(), 1);
    }

    #[tokio::test]
    async fn test_stop_success() {
        let compose = Arc::new(ScriptedCompose::new().with_log_lines(vec!["db-1 exited\n".into()]));
        let controller = controller(compose.clone(), 20);
        let (channel, stream) = EventChannel::new();

        controller.stop(&channel).await.unwrap();
        drop(channel);

        let frames = stream.collect_frames().await;
        assert_eq!(commits(&frames), vec![(Some(200), STOPPED.to_string())]);
        assert!(compose.calls().contains(&ComposeCall::Down));
    }

    #[tokio::test]
    async fn test_stop_missing_override_executable_still_commits_fault() {
        let missing = || ProcessFault::NotFound {
            program: "podman".into(),
        };
        let compose = Arc::new(
            ScriptedCompose::new()
                .with_down_result(Err(missing()))
                .with_logs_result(Err(missing())),
        );
        let controller = controller(compose, 20);
        let (channel, stream) = EventChannel::new();

        let tailed = controller.stop(&channel).await;
        assert!(tailed.is_err());
        drop(channel);

        let frames = stream.collect_frames().await;
        assert_eq!(commits(&frames), vec![(Some(500), STOP_FAILED.to_string())]);
    }

    #[tokio::test]
    async fn test_single_attempt_probe() {
        let compose = Arc::new(ScriptedCompose::new().with_default_health(STARTING_REPORT));
        let controller = controller(compose.clone(), 20);
        let (channel, stream) = EventChannel::new();

        let outcome = controller.poll_health(PollPolicy::new(1, Duration::ZERO), &channel).await;
        drop(channel);

        assert_eq!(outcome, ProbeOutcome::Exhausted);
        assert_eq!(chunks(&stream.collect_frames().await), vec![STARTING.to_string()]);
        assert_eq!(compose.count(|c| matches!(c, ComposeCall::Ps(_))), 1);
    }
}
