//! Records exchanged with the storage collaborators.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata kept for one ingested document source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderEntry {
    /// Stable identifier of the loader.
    pub unique_id: String,
    /// Loader kind (e.g. "WebLoader").
    #[serde(rename = "type")]
    pub loader_type: String,
    /// Number of chunks written to the vector store.
    pub chunks_processed: usize,
    /// Free-form loader metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Who produced a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Actor {
    /// The person asking.
    Human,
    /// The model answering.
    Ai,
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    pub id: String,
    /// Author.
    pub actor: Actor,
    /// Text.
    pub content: String,
    /// When the message was recorded (ISO 8601).
    pub timestamp: String,
    /// Sources the answer drew on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl Message {
    /// Creates a message.
    #[must_use]
    pub fn new(actor: Actor, content: impl Into<String>) -> Self {
        Self {
            id: crate::utils::generate_uuid().to_string(),
            actor,
            content: content.into(),
            timestamp: crate::utils::iso_timestamp(),
            sources: Vec::new(),
        }
    }

    /// Attaches sources.
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }
}

/// A conversation and its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Entries in insertion order.
    pub entries: Vec<Message>,
}

/// A chunk of a document with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    /// Chunk identifier.
    pub id: String,
    /// Loader that produced the chunk.
    pub loader_id: String,
    /// Source locator.
    pub source: String,
    /// Chunk text.
    pub content: String,
    /// Embedding.
    pub vector: Vec<f32>,
}

/// A chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// Chunk text.
    pub content: String,
    /// Source locator.
    pub source: String,
    /// Similarity score in `[0, 1]`, higher is closer.
    pub score: f32,
}

/// Result of ingesting one document source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSummary {
    /// Loader identifier.
    pub loader_id: String,
    /// Chunks written.
    pub chunks: usize,
}
