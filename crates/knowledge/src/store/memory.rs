//! In-process store for tests and throwaway runs.

use super::DocumentStore;
use crate::types::{Chunk, ChunkId, Document};
use docqa_core::{AppError, AppResult};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    documents: HashMap<String, Document>,
    chunks: BTreeMap<(String, u32), Chunk>,
}

/// Non-durable [`DocumentStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(&self, document: &Document) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.documents.contains_key(&document.id) {
            return Err(AppError::Store(format!(
                "Document {} already exists",
                document.id
            )));
        }
        state.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> AppResult<Option<Document>> {
        Ok(self.state.read().await.documents.get(id).cloned())
    }

    async fn list_documents(&self) -> AppResult<Vec<Document>> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state.documents.values().cloned().collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(documents)
    }

    async fn update_document(&self, document: &Document) -> AppResult<()> {
        let mut state = self.state.write().await;
        match state.documents.get_mut(&document.id) {
            Some(existing) => {
                *existing = Document {
                    created_at: existing.created_at,
                    ..document.clone()
                };
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Document {}", document.id))),
        }
    }

    async fn delete_document(&self, id: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        state.chunks.retain(|(document_id, _), _| document_id != id);
        Ok(state.documents.remove(id).is_some())
    }

    async fn create_chunks_bulk(&self, chunks: &[Chunk]) -> AppResult<()> {
        let mut state = self.state.write().await;

        let mut keys = std::collections::HashSet::new();
        for chunk in chunks {
            let key = (chunk.document_id.clone(), chunk.local_index);
            if state.chunks.contains_key(&key) || !keys.insert(key) {
                return Err(AppError::Store(format!(
                    "Chunk {} already exists",
                    chunk.external_id()
                )));
            }
        }

        for chunk in chunks {
            state
                .chunks
                .insert((chunk.document_id.clone(), chunk.local_index), chunk.clone());
        }
        Ok(())
    }

    async fn get_chunks_by_document(&self, document_id: &str) -> AppResult<Vec<Chunk>> {
        let state = self.state.read().await;
        Ok(state
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn get_chunk_by_external_id(&self, id: &ChunkId) -> AppResult<Option<Chunk>> {
        let state = self.state.read().await;
        Ok(state
            .chunks
            .get(&(id.document_id.clone(), id.local_index))
            .cloned())
    }

    async fn delete_chunks_by_document(&self, document_id: &str) -> AppResult<usize> {
        let mut state = self.state.write().await;
        let before = state.chunks.len();
        state.chunks.retain(|(owner, _), _| owner != document_id);
        Ok(before - state.chunks.len())
    }

    async fn all_chunks(&self) -> AppResult<Vec<Chunk>> {
        Ok(self.state.read().await.chunks.values().cloned().collect())
    }

    async fn chunk_counts(&self) -> AppResult<HashMap<String, usize>> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for (document_id, _) in state.chunks.keys() {
            *counts.entry(document_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn counts(&self) -> AppResult<(usize, usize)> {
        let state = self.state.read().await;
        Ok((state.documents.len(), state.chunks.len()))
    }
}
