//! Retrieval-augmented generation collaborators.
//!
//! The orchestrator never looks inside these: it builds them, hands them to a
//! [`RagBackendBuilder`], and closes the stores when the request ends.

mod backend;
mod chunk;
mod loader;
mod memory;
#[cfg(feature = "web")]
mod ollama;
mod types;

pub use backend::{RetrievalBackend, RetrievalBackendBuilder};
pub use chunk::Chunker;
pub use loader::{DocumentLoader, DocumentSource};
pub use memory::{MemoryMetadataStore, MemoryVectorStore};
#[cfg(feature = "web")]
pub use ollama::OllamaModel;
pub use types::{
    Actor, Conversation, EmbeddedChunk, LoaderEntry, LoaderSummary, Message, ScoredChunk,
};

#[cfg(feature = "web")]
use crate::config::StackConfig;
use crate::errors::StackResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Loader and conversation records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Prepares the store for use.
    async fn init(&self) -> StackResult<()>;

    /// Creates or replaces a loader record.
    async fn add_loader_metadata(&self, loader_id: &str, entry: LoaderEntry) -> StackResult<()>;

    /// Reads a loader record.
    async fn get_loader_metadata(&self, loader_id: &str) -> StackResult<Option<LoaderEntry>>;

    /// Returns true if a loader record exists.
    async fn has_loader_metadata(&self, loader_id: &str) -> StackResult<bool>;

    /// Deletes a loader record.
    async fn delete_loader_metadata(&self, loader_id: &str) -> StackResult<()>;

    /// Appends a message, creating the conversation if needed.
    async fn add_conversation_entry(&self, conversation_id: &str, message: Message)
        -> StackResult<()>;

    /// Reads a conversation.
    async fn get_conversation(&self, conversation_id: &str) -> StackResult<Option<Conversation>>;

    /// Deletes a conversation.
    async fn delete_conversation(&self, conversation_id: &str) -> StackResult<()>;

    /// Releases the store's resources.
    async fn close(&self) -> StackResult<()>;
}

/// Embedded chunks with similarity search.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Prepares the store for vectors of `dimensions` components.
    async fn init(&self, dimensions: usize) -> StackResult<()>;

    /// Inserts a batch, returning the number of rows written.
    async fn insert_chunks(&self, chunks: Vec<EmbeddedChunk>) -> StackResult<usize>;

    /// Returns the `k` chunks closest to `query`.
    async fn similarity_search(&self, query: Vec<f32>, k: usize) -> StackResult<Vec<ScoredChunk>>;

    /// Returns the number of stored chunks.
    async fn count(&self) -> StackResult<usize>;

    /// Deletes every chunk of a loader.
    async fn delete_by_loader(&self, loader_id: &str) -> StackResult<bool>;

    /// Releases the store's resources.
    async fn close(&self) -> StackResult<()>;
}

/// A model used both to embed text and to answer.
#[async_trait]
pub trait InferenceModel: Send + Sync {
    /// Model identifier.
    fn name(&self) -> &str;

    /// Embeds `text`.
    async fn embed(&self, text: &str) -> StackResult<Vec<f32>>;

    /// Completes `prompt`.
    async fn generate(&self, prompt: &str) -> StackResult<String>;
}

/// A ready retrieval backend.
#[async_trait]
pub trait RagBackend: Send + Sync {
    /// Ingests a document source.
    async fn add_loader(&self, source: &DocumentSource) -> StackResult<LoaderSummary>;

    /// Answers a query against the ingested documents.
    async fn query(&self, question: &str) -> StackResult<String>;
}

/// The collaborators a backend is built from.
#[derive(Clone)]
pub struct BackendParts {
    /// Loader and conversation records.
    pub store: Arc<dyn MetadataStore>,
    /// Vector storage.
    pub vectors: Arc<dyn VectorStore>,
    /// Embedder and responder.
    pub model: Arc<dyn InferenceModel>,
}

/// Builds a backend from its parts.
#[async_trait]
pub trait RagBackendBuilder: Send + Sync {
    /// Builds the backend, initializing the stores.
    async fn build(&self, parts: BackendParts) -> StackResult<Box<dyn RagBackend>>;
}

/// Source of the collaborators for one Run request.
pub trait Collaborators: Send + Sync {
    /// A metadata store for this request.
    fn metadata_store(&self) -> Arc<dyn MetadataStore>;

    /// A vector store for this request.
    fn vector_store(&self) -> Arc<dyn VectorStore>;

    /// The reserved model as an embedder and responder.
    fn model(&self, name: &str) -> Arc<dyn InferenceModel>;

    /// The backend builder.
    fn backend_builder(&self) -> Arc<dyn RagBackendBuilder>;
}

/// Collaborators for a local stack: in-memory stores and the stack's
/// inference server.
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct LocalCollaborators {
    config: Arc<StackConfig>,
}

#[cfg(feature = "web")]
impl LocalCollaborators {
    /// Creates collaborators from the stack configuration.
    #[must_use]
    pub fn new(config: Arc<StackConfig>) -> Self {
        Self { config }
    }
}

#[cfg(feature = "web")]
impl Collaborators for LocalCollaborators {
    fn metadata_store(&self) -> Arc<dyn MetadataStore> {
        Arc::new(MemoryMetadataStore::new())
    }

    fn vector_store(&self) -> Arc<dyn VectorStore> {
        Arc::new(MemoryVectorStore::new(self.config.vector_table.clone()))
    }

    fn model(&self, name: &str) -> Arc<dyn InferenceModel> {
        Arc::new(OllamaModel::new(self.config.inference_base_url.clone(), name))
    }

    fn backend_builder(&self) -> Arc<dyn RagBackendBuilder> {
        Arc::new(RetrievalBackendBuilder::default())
    }
}
