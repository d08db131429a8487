//! The Run pipeline: reserve a model, build a retrieval backend over a
//! document, answer one query, and always release what was acquired.

mod request;
mod runtime;

pub use request::{ProvisionRequest, FIELD_MODEL, FIELD_QUERY, FIELD_SOURCE, FIELD_SOURCE_ALT};
pub use runtime::ModelRuntime;

use crate::classifier::ErrorClassifier;
use crate::cleanup::{run_with_cleanup, CleanupRegistry};
use crate::compose::ComposeRunner;
use crate::config::StackConfig;
use crate::errors::{PipelineStep, StackError, StackResult};
use crate::events::{EventChannel, StreamEvent};
use crate::rag::{BackendParts, Collaborators, MetadataStore, VectorStore};
use futures::TryFutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const CLEANUP_STEP_TIMEOUT: Duration = Duration::from_secs(30);
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(90);

/// How a Run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// The answer, when every step succeeded.
    pub answer: Option<String>,
    /// The step that failed, if any.
    pub failed_step: Option<PipelineStep>,
}

impl PipelineOutcome {
    /// Returns true when the answer was delivered.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.answer.is_some()
    }
}

/// Runs Run requests against the stack.
pub struct ProvisionPipeline {
    runtime: ModelRuntime,
    collaborators: Arc<dyn Collaborators>,
    classifier: ErrorClassifier,
}

impl ProvisionPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        config: &StackConfig,
        compose: Arc<dyn ComposeRunner>,
        collaborators: Arc<dyn Collaborators>,
    ) -> Self {
        Self {
            runtime: ModelRuntime::new(config, compose),
            collaborators,
            classifier: ErrorClassifier::from_config(config),
        }
    }

    /// Runs `request`, streaming progress to `channel`.
    ///
    /// On success the answer is committed with 200. On any failure the error
    /// is logged and a fault is committed with 500. Either way the model is
    /// released once and both stores are closed before the commit.
    pub async fn run(&self, request: &ProvisionRequest, channel: &EventChannel) -> PipelineOutcome {
        let model = request.model_name.clone();
        info!(model = %model, source = %request.document_source, "Run started");

        let store = self.collaborators.metadata_store();
        let vectors = self.collaborators.vector_store();
        let cleanup = self.register_cleanup(&model, &store, &vectors);

        let work = self
            .execute(request, store, vectors, channel)
            .inspect_err(|err| {
                self.classifier.log_unless_benign("Run failed", err);
            });
        let result = run_with_cleanup(
            work,
            || async {
                cleanup.run_all(CLEANUP_STEP_TIMEOUT).await;
            },
            CLEANUP_TIMEOUT,
        )
        .await;

        match result {
            Ok(answer) => {
                channel.emit(StreamEvent::success(answer.clone()));
                PipelineOutcome {
                    answer: Some(answer),
                    failed_step: None,
                }
            }
            Err(err) => {
                let failed_step = match &err {
                    StackError::Pipeline { step, .. } => Some(*step),
                    _ => None,
                };
                let message = failed_step.map_or_else(
                    || "Run failed".to_string(),
                    |step| format!("Run failed at {step}"),
                );
                channel.emit(StreamEvent::fault(message));
                PipelineOutcome {
                    answer: None,
                    failed_step,
                }
            }
        }
    }

    fn register_cleanup(
        &self,
        model: &str,
        store: &Arc<dyn MetadataStore>,
        vectors: &Arc<dyn VectorStore>,
    ) -> CleanupRegistry {
        let cleanup = CleanupRegistry::new();

        let store = store.clone();
        cleanup.register("close metadata store", async move { store.close().await });
        let vectors = vectors.clone();
        cleanup.register("close vector store", async move { vectors.close().await });

        let runtime = self.runtime.clone();
        let classifier = self.classifier.clone();
        let model = model.to_string();
        cleanup.register("release model", async move {
            if let Err(err) = runtime.release(&model).await {
                classifier.log_unless_benign("Model release failed", &err);
            }
            Ok(())
        });
        cleanup
    }

    async fn execute(
        &self,
        request: &ProvisionRequest,
        store: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
        channel: &EventChannel,
    ) -> StackResult<String> {
        let model = request.model_name.as_str();
        channel.emit(StreamEvent::progress(format!("Processing model: {model}..")));
        self.runtime
            .reserve(model, channel)
            .await
            .map_err(|e| e.in_step(PipelineStep::ReserveModel))?;
        drop(self.runtime.warm(model));

        channel.emit(StreamEvent::progress("Building RAG Application."));
        let parts = BackendParts {
            store,
            vectors,
            model: self.collaborators.model(model),
        };
        let backend = self
            .collaborators
            .backend_builder()
            .build(parts)
            .await
            .map_err(|e| e.in_step(PipelineStep::BuildBackend))?;
        channel.emit(StreamEvent::progress("RAG Application initialized."));

        let source = &request.document_source;
        channel.emit(StreamEvent::progress(format!("Loading data from {source}.")));
        backend
            .add_loader(source)
            .await
            .map_err(|e| e.in_step(PipelineStep::LoadDocument))?;
        channel.emit(StreamEvent::progress(format!("Data loaded from {source}.")));

        channel.emit(StreamEvent::progress(format!("Asking query: {}.", request.query)));
        let answer = backend
            .query(&request.query)
            .await
            .map_err(|e| e.in_step(PipelineStep::Query))?;
        channel.emit(StreamEvent::progress("Response received for query."));
        Ok(answer)
    }
}

impl std::fmt::Debug for ProvisionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionPipeline")
            .field("runtime", &self.runtime)
            .field("classifier", &self.classifier)
            .finish()
    }
}
