//! Reserving, warming and releasing models inside the inference container.

use crate::classifier::ErrorClassifier;
use crate::compose::ComposeRunner;
use crate::config::StackConfig;
use crate::errors::StackResult;
use crate::events::EventChannel;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Model operations run through `compose exec` in the inference service.
#[derive(Clone)]
pub struct ModelRuntime {
    compose: Arc<dyn ComposeRunner>,
    service: String,
    keep_alive: String,
    classifier: ErrorClassifier,
}

impl ModelRuntime {
    /// Creates a runtime for the configured inference service.
    #[must_use]
    pub fn new(config: &StackConfig, compose: Arc<dyn ComposeRunner>) -> Self {
        Self {
            compose,
            service: config.inference_service.clone(),
            keep_alive: config.keep_alive.clone(),
            classifier: ErrorClassifier::from_config(config),
        }
    }

    fn ollama(args: &[&str]) -> Vec<String> {
        std::iter::once("ollama")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    /// Pulls `model` if absent, streaming the pull output.
    pub async fn reserve(&self, model: &str, output: &EventChannel) -> StackResult<()> {
        info!(model, "Reserving model");
        self.compose
            .exec(&self.service, &Self::ollama(&["pull", model]), Some(output))
            .await
    }

    /// Loads `model` with the keep-alive window without waiting for it.
    ///
    /// Failures are logged unless benign and never reach the caller.
    pub fn warm(&self, model: &str) -> JoinHandle<()> {
        let runtime = self.clone();
        let command = Self::ollama(&["run", model, "--keepalive", &self.keep_alive]);
        let model = model.to_string();
        tokio::spawn(async move {
            match runtime.compose.exec(&runtime.service, &command, None).await {
                Ok(()) => debug!(model = %model, "Model warmed"),
                Err(err) => {
                    runtime.classifier.log_unless_benign("Model warm-up failed", &err);
                }
            }
        })
    }

    /// Unloads `model`.
    pub async fn release(&self, model: &str) -> StackResult<()> {
        debug!(model, "Releasing model");
        self.compose
            .exec(&self.service, &Self::ollama(&["stop", model]), None)
            .await
    }
}

impl std::fmt::Debug for ModelRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRuntime")
            .field("service", &self.service)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProcessFault;
    use crate::testing::{ComposeCall, ScriptedCompose};
    use pretty_assertions::assert_eq;

    fn runtime(compose: Arc<ScriptedCompose>) -> ModelRuntime {
        ModelRuntime::new(&StackConfig::new("/srv/stack"), compose)
    }

    #[tokio::test]
    async fn test_commands() {
        let compose = Arc::new(ScriptedCompose::new());
        let runtime = runtime(compose.clone());
        let (channel, _stream) = EventChannel::new();

        runtime.reserve("demo", &channel).await.unwrap();
        runtime.warm("demo").await.unwrap();
        runtime.release("demo").await.unwrap();

        let exec = |words: &[&str]| ComposeCall::Exec {
            service: "ollama".into(),
            command: words.iter().map(|w| (*w).to_string()).collect(),
        };
        assert_eq!(
            compose.calls(),
            vec![
                exec(&["ollama", "pull", "demo"]),
                exec(&["ollama", "run", "demo", "--keepalive", "10m"]),
                exec(&["ollama", "stop", "demo"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_warm_failure_is_swallowed() {
        let compose = Arc::new(ScriptedCompose::new().with_exec_fault(
            "run",
            ProcessFault::Exited {
                command: "podman compose exec".into(),
                exit_code: 1,
                stderr: "model not found".into(),
            },
        ));
        let handle = runtime(compose).warm("demo");
        assert!(handle.await.is_ok());
    }
}
