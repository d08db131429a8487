//! In-process implementations of the storage collaborators.

use super::types::{Conversation, EmbeddedChunk, LoaderEntry, Message, ScoredChunk};
use super::{MetadataStore, VectorStore};
use crate::errors::{StackError, StackResult};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

fn closed(store: &str) -> StackError {
    StackError::Configuration(format!("{store} is closed"))
}

/// Metadata store backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    loaders: DashMap<String, LoaderEntry>,
    conversations: DashMap<String, Conversation>,
    closed: AtomicBool,
}

impl MemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once [`MetadataStore::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> StackResult<()> {
        if self.is_closed() {
            return Err(closed("metadata store"));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn init(&self) -> StackResult<()> {
        self.check_open()
    }

    async fn add_loader_metadata(&self, loader_id: &str, entry: LoaderEntry) -> StackResult<()> {
        self.check_open()?;
        self.loaders.insert(loader_id.to_string(), entry);
        Ok(())
    }

    async fn get_loader_metadata(&self, loader_id: &str) -> StackResult<Option<LoaderEntry>> {
        self.check_open()?;
        Ok(self.loaders.get(loader_id).map(|e| e.value().clone()))
    }

    async fn has_loader_metadata(&self, loader_id: &str) -> StackResult<bool> {
        self.check_open()?;
        Ok(self.loaders.contains_key(loader_id))
    }

    async fn delete_loader_metadata(&self, loader_id: &str) -> StackResult<()> {
        self.check_open()?;
        self.loaders.remove(loader_id);
        Ok(())
    }

    async fn add_conversation_entry(
        &self,
        conversation_id: &str,
        message: Message,
    ) -> StackResult<()> {
        self.check_open()?;
        self.conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation {
                conversation_id: conversation_id.to_string(),
                entries: Vec::new(),
            })
            .entries
            .push(message);
        Ok(())
    }

    async fn get_conversation(&self, conversation_id: &str) -> StackResult<Option<Conversation>> {
        self.check_open()?;
        Ok(self
            .conversations
            .get(conversation_id)
            .map(|c| c.value().clone()))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> StackResult<()> {
        self.check_open()?;
        self.conversations.remove(conversation_id);
        Ok(())
    }

    async fn close(&self) -> StackResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Metadata store closed");
        }
        Ok(())
    }
}

/// Vector table kept in memory, searched by cosine similarity.
#[derive(Debug)]
pub struct MemoryVectorStore {
    table: String,
    dimensions: RwLock<Option<usize>>,
    rows: RwLock<Vec<EmbeddedChunk>>,
    closed: AtomicBool,
}

impl MemoryVectorStore {
    /// Creates an empty table.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            dimensions: RwLock::new(None),
            rows: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns true once [`VectorStore::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> StackResult<()> {
        if self.is_closed() {
            return Err(closed(&format!("vector table {}", self.table)));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn init(&self, dimensions: usize) -> StackResult<()> {
        self.check_open()?;
        // Re-initializing drops the table.
        *self.dimensions.write() = Some(dimensions);
        self.rows.write().clear();
        debug!(table = %self.table, dimensions, "Vector table initialized");
        Ok(())
    }

    async fn insert_chunks(&self, chunks: Vec<EmbeddedChunk>) -> StackResult<usize> {
        self.check_open()?;
        let dimensions = self
            .dimensions
            .read()
            .ok_or_else(|| StackError::Configuration(format!("table {} not initialized", self.table)))?;
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != dimensions) {
            return Err(StackError::Configuration(format!(
                "chunk {} has {} dimensions, table {} expects {dimensions}",
                bad.id,
                bad.vector.len(),
                self.table
            )));
        }
        let count = chunks.len();
        let mut rows = self.rows.write();
        for chunk in chunks {
            match rows.iter_mut().find(|r| r.id == chunk.id) {
                Some(existing) => *existing = chunk,
                None => rows.push(chunk),
            }
        }
        Ok(count)
    }

    async fn similarity_search(&self, query: Vec<f32>, k: usize) -> StackResult<Vec<ScoredChunk>> {
        self.check_open()?;
        let rows = self.rows.read();
        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| ScoredChunk {
                content: row.content.clone(),
                source: row.source.clone(),
                score: cosine_similarity(&query, &row.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> StackResult<usize> {
        self.check_open()?;
        Ok(self.rows.read().len())
    }

    async fn delete_by_loader(&self, loader_id: &str) -> StackResult<bool> {
        self.check_open()?;
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|r| r.loader_id != loader_id);
        Ok(rows.len() != before)
    }

    async fn close(&self) -> StackResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(table = %self.table, "Vector table closed");
        }
        Ok(())
    }
}

/// Cosine similarity mapped into `[0, 1]`. Zero vectors score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    (cosine + 1.0) / 2.0
}
