//! Request dispatch and the top-level result boundary.
//!
//! A request is validated before anything streams: an unknown method or a Run
//! missing a field is returned to the caller as a client error. Valid
//! requests get an [`EventStream`] immediately while the work runs on its own
//! task. Errors that escape the work are classified here: benign ones are
//! dropped silently, real ones are logged and committed as a fault if nothing
//! committed yet.

use crate::classifier::ErrorClassifier;
use crate::compose::ComposeRunner;
use crate::config::StackConfig;
use crate::errors::{RequestError, StackError, StackResult};
use crate::events::{EventChannel, EventStream, StreamEvent};
use crate::lifecycle::LifecycleController;
use crate::observability::RequestTimer;
use crate::pipeline::{ProvisionPipeline, ProvisionRequest};
use crate::rag::Collaborators;
use crate::utils::generate_uuid_v7;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

/// What a request asks of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackIntent {
    /// Bring the stack up (POST).
    Start,
    /// Tear the stack down (DELETE).
    Stop,
    /// Answer a query over a document (PUT).
    Run,
}

impl StackIntent {
    /// Maps a request method to an intent.
    pub fn from_method(method: &str) -> Result<Self, RequestError> {
        match method.to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Start),
            "DELETE" => Ok(Self::Stop),
            "PUT" => Ok(Self::Run),
            other => Err(RequestError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Lowercase name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Run => "run",
        }
    }
}

impl fmt::Display for StackIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackRequest {
    /// Bring the stack up.
    Start,
    /// Tear the stack down.
    Stop,
    /// Run the provisioning pipeline.
    Run(ProvisionRequest),
}

impl StackRequest {
    /// Validates a request from its intent and form fields.
    pub fn parse(intent: StackIntent, fields: &HashMap<String, String>) -> Result<Self, RequestError> {
        match intent {
            StackIntent::Start => Ok(Self::Start),
            StackIntent::Stop => Ok(Self::Stop),
            StackIntent::Run => ProvisionRequest::from_fields(fields).map(Self::Run),
        }
    }

    /// The request's intent.
    #[must_use]
    pub fn intent(&self) -> StackIntent {
        match self {
            Self::Start => StackIntent::Start,
            Self::Stop => StackIntent::Stop,
            Self::Run(_) => StackIntent::Run,
        }
    }
}

/// A dispatched request: the stream to drain and the task producing it.
#[derive(Debug)]
pub struct Dispatched {
    /// Frames for the transport.
    pub stream: EventStream,
    /// The work. Completes after the stream's last frame is sent.
    pub task: JoinHandle<()>,
}

/// Dispatches requests to the lifecycle controller and the pipeline.
#[derive(Clone)]
pub struct StackHandler {
    lifecycle: Arc<LifecycleController>,
    pipeline: Arc<ProvisionPipeline>,
    classifier: ErrorClassifier,
}

impl StackHandler {
    /// Creates a handler over the given collaborators.
    #[must_use]
    pub fn new(
        config: Arc<StackConfig>,
        compose: Arc<dyn ComposeRunner>,
        collaborators: Arc<dyn Collaborators>,
    ) -> Self {
        let pipeline = ProvisionPipeline::new(&config, compose.clone(), collaborators);
        let classifier = ErrorClassifier::from_config(&config);
        Self {
            lifecycle: Arc::new(LifecycleController::new(config, compose)),
            pipeline: Arc::new(pipeline),
            classifier,
        }
    }

    /// Creates a handler for the real stack: the configured executable and
    /// the stack's inference server.
    #[cfg(feature = "web")]
    #[must_use]
    pub fn from_config(config: StackConfig) -> Self {
        let config = Arc::new(config);
        let compose = Arc::new(crate::compose::ProcessCompose::from_config(&config));
        let collaborators = Arc::new(crate::rag::LocalCollaborators::new(config.clone()));
        Self::new(config, compose, collaborators)
    }

    /// Validates and dispatches a request by method name.
    ///
    /// Must be called within a Tokio runtime.
    pub fn handle(&self, method: &str, fields: &HashMap<String, String>) -> StackResult<Dispatched> {
        let intent = StackIntent::from_method(method)?;
        let request = StackRequest::parse(intent, fields)?;
        Ok(self.dispatch(request))
    }

    /// Dispatches a validated request.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn dispatch(&self, request: StackRequest) -> Dispatched {
        let (channel, stream) = EventChannel::new();
        let handler = self.clone();
        let intent = request.intent();
        let span = info_span!("request", request_id = %generate_uuid_v7(), %intent);
        let task = tokio::spawn(
            async move {
                info!("Request dispatched");
                let timer = RequestTimer::start(intent.as_str());

                let result = handler.execute(request, &channel).await;
                if let Err(err) = result {
                    handler.contain(&err, &channel);
                }
                timer.finish(channel.commit_code());
            }
            .instrument(span),
        );
        Dispatched { stream, task }
    }

    async fn execute(&self, request: StackRequest, channel: &EventChannel) -> StackResult<()> {
        match request {
            StackRequest::Start => self.lifecycle.start(channel).await.map(drop),
            StackRequest::Stop => self.lifecycle.stop(channel).await,
            StackRequest::Run(request) => {
                self.pipeline.run(&request, channel).await;
                Ok(())
            }
        }
    }

    /// Handles an error that escaped the work.
    fn contain(&self, err: &StackError, channel: &EventChannel) {
        if self.classifier.is_benign(err) {
            return;
        }
        error!(error = %err, "Request failed");
        if !channel.is_committed() {
            channel.emit(StreamEvent::fault(err.to_string()));
        }
    }
}

impl fmt::Debug for StackHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackHandler")
            .field("lifecycle", &self.lifecycle)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ProcessFault, STATUS_BAD_REQUEST};
    use crate::events::commits;
    use crate::testing::{ScriptedBackendBuilder, ScriptedCompose, TestCollaborators};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const HEALTHY: &str = r#"{"State":"running","Health":"healthy"}"#;

    fn handler(compose: ScriptedCompose, executable: &str) -> StackHandler {
        let config = StackConfig::new("/srv/stack")
            .with_executable(executable)
            .with_poll_delay(Duration::from_millis(1));
        let collaborators = TestCollaborators::in_memory("unused")
            .with_builder(Arc::new(ScriptedBackendBuilder::new("Hello from demo")));
        StackHandler::new(Arc::new(config), Arc::new(compose), Arc::new(collaborators))
    }

    fn run_fields() -> HashMap<String, String> {
        [
            ("modelName", "demo"),
            ("webUrl", "https://example.com"),
            ("query", "hello"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_intent_from_method() {
        assert_eq!(StackIntent::from_method("POST").unwrap(), StackIntent::Start);
        assert_eq!(StackIntent::from_method("delete").unwrap(), StackIntent::Stop);
        assert_eq!(StackIntent::from_method("PUT").unwrap(), StackIntent::Run);
        assert_eq!(
            StackIntent::from_method("GET").unwrap_err(),
            RequestError::UnsupportedMethod("GET".into())
        );
    }

    #[tokio::test]
    async fn test_run_missing_field_is_client_error() {
        let handler = handler(ScriptedCompose::new(), "podman");
        let mut fields = run_fields();
        fields.remove("query");

        let err = handler.handle("PUT", &fields).unwrap_err();
        assert_eq!(err.status_code(), STATUS_BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_request() {
        let handler = handler(ScriptedCompose::new().with_default_health(HEALTHY), "podman");
        let dispatched = handler.handle("POST", &HashMap::new()).unwrap();

        let frames = dispatched.stream.collect_frames().await;
        dispatched.task.await.unwrap();
        assert_eq!(
            commits(&frames),
            vec![(Some(200), "DB and Ollama started".to_string())]
        );
    }

    #[tokio::test]
    async fn test_run_request() {
        let handler = handler(ScriptedCompose::new(), "podman");
        let dispatched = handler.handle("PUT", &run_fields()).unwrap();

        let frames = dispatched.stream.collect_frames().await;
        assert_eq!(commits(&frames), vec![(Some(200), "Hello from demo".to_string())]);
    }

    #[tokio::test]
    async fn test_stop_real_fault_commits_once() {
        let missing = || ProcessFault::NotFound {
            program: "docker".into(),
        };
        let compose = ScriptedCompose::new()
            .with_down_result(Err(missing()))
            .with_logs_result(Err(missing()));
        let handler = handler(compose, "docker");
        let dispatched = handler.handle("DELETE", &HashMap::new()).unwrap();

        let frames = dispatched.stream.collect_frames().await;
        let committed = commits(&frames);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].0, Some(500));
    }

    #[tokio::test]
    async fn test_escaped_error_commits_when_nothing_committed() {
        let handler = handler(ScriptedCompose::new(), "docker");
        let (channel, stream) = EventChannel::new();

        handler.contain(&StackError::HealthCheck("ps output unreadable".into()), &channel);
        drop(channel);

        let frames = stream.collect_frames().await;
        assert_eq!(
            commits(&frames),
            vec![(Some(500), "Health check failed: ps output unreadable".to_string())]
        );
    }

    #[tokio::test]
    async fn test_escaped_benign_error_is_swallowed() {
        let handler = handler(ScriptedCompose::new(), "podman");
        let (channel, stream) = EventChannel::new();

        let benign: StackError = ProcessFault::NotFound {
            program: "podman".into(),
        }
        .into();
        handler.contain(&benign, &channel);
        drop(channel);

        assert!(stream.collect_frames().await.is_empty());
    }
}
