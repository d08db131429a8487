//! The default retrieval backend: chunk, embed, store, retrieve, prompt.

use super::chunk::Chunker;
use super::loader::{DocumentLoader, DocumentSource};
use super::types::{Actor, EmbeddedChunk, LoaderEntry, LoaderSummary, Message};
use super::{BackendParts, InferenceModel, MetadataStore, RagBackend, RagBackendBuilder, VectorStore};
use crate::errors::{PipelineStep, StackError, StackResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const DIMENSION_PROBE: &str = "dimension probe";

/// Conversation that answers are recorded under.
pub const DEFAULT_CONVERSATION: &str = "default";

fn chunk_id(loader_id: &str, index: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(loader_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds [`RetrievalBackend`]s.
#[derive(Debug, Clone)]
pub struct RetrievalBackendBuilder {
    chunker: Chunker,
    top_k: usize,
}

impl Default for RetrievalBackendBuilder {
    fn default() -> Self {
        Self {
            chunker: Chunker::new(1000, 200),
            top_k: 7,
        }
    }
}

impl RetrievalBackendBuilder {
    /// Sets the chunker.
    #[must_use]
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// Sets how many chunks are retrieved per query.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }
}

#[async_trait]
impl RagBackendBuilder for RetrievalBackendBuilder {
    async fn build(&self, parts: BackendParts) -> StackResult<Box<dyn RagBackend>> {
        parts.store.init().await?;
        let dimensions = parts.model.embed(DIMENSION_PROBE).await?.len();
        parts.vectors.init(dimensions).await?;
        debug!(model = %parts.model.name(), dimensions, "Retrieval backend ready");

        Ok(Box::new(RetrievalBackend {
            store: parts.store,
            vectors: parts.vectors,
            model: parts.model,
            loader: DocumentLoader::new(),
            chunker: self.chunker,
            top_k: self.top_k,
        }))
    }
}

/// Answers queries from ingested documents.
pub struct RetrievalBackend {
    store: Arc<dyn MetadataStore>,
    vectors: Arc<dyn VectorStore>,
    model: Arc<dyn InferenceModel>,
    loader: DocumentLoader,
    chunker: Chunker,
    top_k: usize,
}

impl RetrievalBackend {
    fn prompt(question: &str, context: &[String]) -> String {
        format!(
            "Use all the provided context to answer the query at the end. \
             If you don't know the answer, say you don't know; do not make one up.\n\n\
             Context:\n{}\n\nQuery: {question}\n\nHelpful answer:",
            context.join("\n\n")
        )
    }
}

#[async_trait]
impl RagBackend for RetrievalBackend {
    async fn add_loader(&self, source: &DocumentSource) -> StackResult<LoaderSummary> {
        let loader_id = source.loader_id();
        if self.store.has_loader_metadata(&loader_id).await? {
            debug!(loader_id = %loader_id, "Replacing previously ingested source");
            self.vectors.delete_by_loader(&loader_id).await?;
            self.store.delete_loader_metadata(&loader_id).await?;
        }

        let text = self.loader.load(source).await?;
        let pieces = self.chunker.split(&text);
        if pieces.is_empty() {
            return Err(StackError::pipeline(
                PipelineStep::LoadDocument,
                format!("{source} has no text"),
            ));
        }

        let mut batch = Vec::with_capacity(pieces.len());
        for (index, content) in pieces.into_iter().enumerate() {
            let vector = self.model.embed(&content).await?;
            batch.push(EmbeddedChunk {
                id: chunk_id(&loader_id, index, &content),
                loader_id: loader_id.clone(),
                source: source.to_string(),
                content,
                vector,
            });
        }
        let chunks = self.vectors.insert_chunks(batch).await?;

        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), serde_json::json!(source.to_string()));
        self.store
            .add_loader_metadata(
                &loader_id,
                LoaderEntry {
                    unique_id: loader_id.clone(),
                    loader_type: source.kind().to_string(),
                    chunks_processed: chunks,
                    metadata,
                },
            )
            .await?;

        info!(loader_id = %loader_id, chunks, "Source ingested");
        Ok(LoaderSummary { loader_id, chunks })
    }

    async fn query(&self, question: &str) -> StackResult<String> {
        let query_vector = self.model.embed(question).await?;
        let hits = self.vectors.similarity_search(query_vector, self.top_k).await?;
        let context: Vec<String> = hits.iter().map(|h| h.content.clone()).collect();
        let mut sources: Vec<String> = hits.into_iter().map(|h| h.source).collect();
        sources.dedup();

        let answer = self.model.generate(&Self::prompt(question, &context)).await?;

        self.store
            .add_conversation_entry(DEFAULT_CONVERSATION, Message::new(Actor::Human, question))
            .await?;
        self.store
            .add_conversation_entry(
                DEFAULT_CONVERSATION,
                Message::new(Actor::Ai, answer.clone()).with_sources(sources),
            )
            .await?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::memory::{MemoryMetadataStore, MemoryVectorStore};
    use crate::rag::{MockMetadataStore, MockVectorStore};
    use crate::testing::HashEmbeddingModel;
    use pretty_assertions::assert_eq;

    fn parts() -> (BackendParts, Arc<MemoryMetadataStore>, Arc<MemoryVectorStore>) {
        let store = Arc::new(MemoryMetadataStore::new());
        let vectors = Arc::new(MemoryVectorStore::new("vectorTab"));
        let parts = BackendParts {
            store: store.clone(),
            vectors: vectors.clone(),
            model: Arc::new(HashEmbeddingModel::new("demo").with_answer("forty-two")),
        };
        (parts, store, vectors)
    }

    #[test]
    fn test_chunk_id_is_sha256_hex() {
        let id = chunk_id("l1", 0, "text");
        assert_eq!(id.len(), 64);
        assert_eq!(id, chunk_id("l1", 0, "text"));
        assert_ne!(id, chunk_id("l1", 1, "text"));
    }

    #[tokio::test]
    async fn test_ingest_and_query() {
        let (parts, store, vectors) = parts();
        let builder = RetrievalBackendBuilder::default().with_chunker(Chunker::new(16, 4));
        let backend = builder.build(parts).await.unwrap();

        let source = DocumentSource::Inline("The answer to everything is forty-two.".into());
        let summary = backend.add_loader(&source).await.unwrap();
        assert_eq!(summary.loader_id, source.loader_id());
        assert!(summary.chunks > 1);
        assert_eq!(vectors.count().await.unwrap(), summary.chunks);

        let entry = store
            .get_loader_metadata(&summary.loader_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.loader_type, "TextLoader");
        assert_eq!(entry.chunks_processed, summary.chunks);

        let answer = backend.query("what is the answer?").await.unwrap();
        assert_eq!(answer, "forty-two");

        let conversation = store
            .get_conversation(DEFAULT_CONVERSATION)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.entries.len(), 2);
        assert_eq!(conversation.entries[1].content, "forty-two");
    }

    #[tokio::test]
    async fn test_reingest_replaces_chunks() {
        let (parts, _store, vectors) = parts();
        let backend = RetrievalBackendBuilder::default()
            .with_chunker(Chunker::new(8, 0))
            .build(parts)
            .await
            .unwrap();

        let source = DocumentSource::Inline("one two three four five six".into());
        let first = backend.add_loader(&source).await.unwrap();
        let second = backend.add_loader(&source).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(vectors.count().await.unwrap(), second.chunks);
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected() {
        let (parts, _, _) = parts();
        let backend = RetrievalBackendBuilder::default().build(parts).await.unwrap();
        let err = backend
            .add_loader(&DocumentSource::Inline("   ".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StackError::Pipeline { step: PipelineStep::LoadDocument, ref message }
                if message.contains("has no text")
        ));
    }

    #[tokio::test]
    async fn test_build_fails_when_store_init_fails() {
        let mut store = MockMetadataStore::new();
        store
            .expect_init()
            .times(1)
            .returning(|| Err(StackError::Configuration("db down".into())));
        let mut vectors = MockVectorStore::new();
        vectors.expect_init().never();

        let parts = BackendParts {
            store: Arc::new(store),
            vectors: Arc::new(vectors),
            model: Arc::new(HashEmbeddingModel::new("demo")),
        };
        let result = RetrievalBackendBuilder::default().build(parts).await;
        assert!(matches!(result, Err(StackError::Configuration(_))));
    }
}
