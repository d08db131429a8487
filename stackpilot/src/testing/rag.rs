//! In-process retrieval collaborators for tests.

use crate::errors::{PipelineStep, StackError, StackResult};
use crate::rag::{
    BackendParts, Collaborators, DocumentSource, InferenceModel, LoaderSummary,
    MemoryMetadataStore, MemoryVectorStore, MetadataStore, RagBackend, RagBackendBuilder,
    RetrievalBackendBuilder, VectorStore,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

const DIMENSIONS: usize = 32;

/// Deterministic model: embeds text as a character histogram and answers
/// with a fixed reply.
#[derive(Debug, Clone)]
pub struct HashEmbeddingModel {
    name: String,
    answer: String,
}

impl HashEmbeddingModel {
    /// Creates a model named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            answer: "I don't know.".to_string(),
        }
    }

    /// Sets the reply to every prompt.
    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = answer.into();
        self
    }
}

#[async_trait]
impl InferenceModel for HashEmbeddingModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> StackResult<Vec<f32>> {
        let mut vector = vec![0.0; DIMENSIONS];
        for c in text.chars().filter(|c| c.is_alphanumeric()) {
            vector[(c.to_ascii_lowercase() as usize) % DIMENSIONS] += 1.0;
        }
        // Keep empty input off the zero vector.
        vector[0] += 0.01;
        Ok(vector)
    }

    async fn generate(&self, _prompt: &str) -> StackResult<String> {
        Ok(self.answer.clone())
    }
}

/// Builder whose backends fail at a chosen step and otherwise answer with
/// a fixed reply. Records what was asked of them.
#[derive(Debug, Default)]
pub struct ScriptedBackendBuilder {
    fail_at: Option<PipelineStep>,
    answer: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackendBuilder {
    /// Creates a builder whose backends answer `answer`.
    #[must_use]
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Self::default()
        }
    }

    /// Fails at `step` (backend build, document load, or query).
    #[must_use]
    pub fn failing_at(mut self, step: PipelineStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Operations performed, e.g. `build`, `load:<source>`, `query:<text>`.
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn check(fail_at: Option<PipelineStep>, step: PipelineStep) -> StackResult<()> {
        if fail_at == Some(step) {
            return Err(StackError::pipeline(step, "scripted failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RagBackendBuilder for ScriptedBackendBuilder {
    async fn build(&self, _parts: BackendParts) -> StackResult<Box<dyn RagBackend>> {
        self.log.lock().push("build".to_string());
        Self::check(self.fail_at, PipelineStep::BuildBackend)?;
        Ok(Box::new(ScriptedBackend {
            fail_at: self.fail_at,
            answer: self.answer.clone(),
            log: self.log.clone(),
        }))
    }
}

struct ScriptedBackend {
    fail_at: Option<PipelineStep>,
    answer: String,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RagBackend for ScriptedBackend {
    async fn add_loader(&self, source: &DocumentSource) -> StackResult<LoaderSummary> {
        self.log.lock().push(format!("load:{}", source.as_str()));
        ScriptedBackendBuilder::check(self.fail_at, PipelineStep::LoadDocument)?;
        Ok(LoaderSummary {
            loader_id: source.loader_id(),
            chunks: 1,
        })
    }

    async fn query(&self, question: &str) -> StackResult<String> {
        self.log.lock().push(format!("query:{question}"));
        ScriptedBackendBuilder::check(self.fail_at, PipelineStep::Query)?;
        Ok(self.answer.clone())
    }
}

/// Collaborators with fixed stores, model and builder.
#[derive(Clone)]
pub struct TestCollaborators {
    /// Metadata store handed out for every request.
    pub store: Arc<dyn MetadataStore>,
    /// Vector store handed out for every request.
    pub vectors: Arc<dyn VectorStore>,
    /// Model handed out for every name.
    pub model: Arc<dyn InferenceModel>,
    /// Backend builder.
    pub builder: Arc<dyn RagBackendBuilder>,
}

impl TestCollaborators {
    /// In-memory stores, the hash model answering `answer`, and the real
    /// retrieval backend.
    #[must_use]
    pub fn in_memory(answer: &str) -> Self {
        Self {
            store: Arc::new(MemoryMetadataStore::new()),
            vectors: Arc::new(MemoryVectorStore::new("vectorTab")),
            model: Arc::new(HashEmbeddingModel::new("test").with_answer(answer)),
            builder: Arc::new(RetrievalBackendBuilder::default()),
        }
    }

    /// Replaces the backend builder.
    #[must_use]
    pub fn with_builder(mut self, builder: Arc<dyn RagBackendBuilder>) -> Self {
        self.builder = builder;
        self
    }

    /// Replaces the stores.
    #[must_use]
    pub fn with_stores(
        mut self,
        store: Arc<dyn MetadataStore>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        self.store = store;
        self.vectors = vectors;
        self
    }
}

impl Collaborators for TestCollaborators {
    fn metadata_store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    fn vector_store(&self) -> Arc<dyn VectorStore> {
        self.vectors.clone()
    }

    fn model(&self, _name: &str) -> Arc<dyn InferenceModel> {
        self.model.clone()
    }

    fn backend_builder(&self) -> Arc<dyn RagBackendBuilder> {
        self.builder.clone()
    }
}
