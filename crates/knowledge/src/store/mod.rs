//! Durable document and chunk storage.
//!
//! The store is the source of truth: the vector index is a cache of the
//! embeddings held here and can always be rebuilt from [`DocumentStore::all_chunks`].

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::types::{Chunk, ChunkId, Document};
use docqa_core::AppResult;
use std::collections::HashMap;

/// Document and chunk persistence.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails if the id already exists.
    async fn create_document(&self, document: &Document) -> AppResult<()>;

    async fn get_document(&self, id: &str) -> AppResult<Option<Document>>;

    /// All documents, oldest first.
    async fn list_documents(&self) -> AppResult<Vec<Document>>;

    /// Replace a stored document's fields. Fails with `NotFound` if absent.
    async fn update_document(&self, document: &Document) -> AppResult<()>;

    /// Delete a document and its chunks. Returns `false` if it did not exist.
    async fn delete_document(&self, id: &str) -> AppResult<bool>;

    /// Insert chunks atomically: either all are stored or none are.
    async fn create_chunks_bulk(&self, chunks: &[Chunk]) -> AppResult<()>;

    /// A document's chunks ordered by local index.
    async fn get_chunks_by_document(&self, document_id: &str) -> AppResult<Vec<Chunk>>;

    async fn get_chunk_by_external_id(&self, id: &ChunkId) -> AppResult<Option<Chunk>>;

    /// Delete a document's chunks, returning how many were removed.
    async fn delete_chunks_by_document(&self, document_id: &str) -> AppResult<usize>;

    /// Every stored chunk, ordered by document then local index.
    async fn all_chunks(&self) -> AppResult<Vec<Chunk>>;

    /// Chunk count per document id.
    async fn chunk_counts(&self) -> AppResult<HashMap<String, usize>>;

    /// `(documents, chunks)` totals.
    async fn counts(&self) -> AppResult<(usize, usize)>;
}
