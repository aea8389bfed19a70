//! Document lifecycle over the store and the vector index.
//!
//! The store is authoritative. Index entries are removed before the chunk
//! records they point at, and added only after those records are stored, so
//! a crash between steps leaves at most unreferenced store rows that
//! [`KnowledgeBase::rebuild_index_from_store`] picks up again.
//!
//! Uploads, updates and deletes hold the lifecycle gate shared; a rebuild
//! holds it exclusively so the store it reads cannot change underneath it.

use crate::chunker::{chunk_text, ChunkOptions};
use crate::config::{get_index_path, get_store_path, KnowledgeBaseConfig};
use crate::embeddings::{create_provider, EmbeddingEngine, EmbeddingProvider};
use crate::index_handle::IndexHandle;
use crate::locks::DocumentLocks;
use crate::parser::{extract_text, FileType};
use crate::rag::{AnswerGenerator, QueryOptions, QueryOrchestrator, QueryResponse};
use crate::store::{DocumentStore, SqliteStore};
use crate::types::{
    BaseStats, Chunk, Document, DocumentDetails, DocumentSummary, DocumentUpdate, IngestStats,
};
use crate::vector_index::{IndexError, VectorIndex};
use docqa_core::{AppConfig, AppError, AppResult};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// The knowledge base service.
pub struct KnowledgeBase {
    config: KnowledgeBaseConfig,
    store: Arc<dyn DocumentStore>,
    index: Arc<IndexHandle>,
    embeddings: EmbeddingEngine,
    orchestrator: QueryOrchestrator,
    locks: DocumentLocks,
    lifecycle: RwLock<()>,
}

impl KnowledgeBase {
    /// Open the knowledge base in `app.workspace`.
    ///
    /// Uses the SQLite store and index snapshot under `.docqa/`, the
    /// configured embedding provider and, unless the provider is `none`, a
    /// generation backend.
    pub async fn open(app: &AppConfig) -> AppResult<Self> {
        let workspace = app.workspace.as_path();
        let config = KnowledgeBaseConfig::load(workspace)?;
        app.ensure_data_dir()?;

        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&get_store_path(workspace))?);
        let provider = create_provider(&config).await?;

        let api_key = app.resolve_api_key();
        let generator = docqa_llm::create_client(&app.provider, app.endpoint.as_deref(), api_key.as_deref())?
            .map(|client| AnswerGenerator::new(client, app.model.clone(), &config));

        Self::assemble(config, store, provider, generator, Some(get_index_path(workspace))).await
    }

    /// Build from explicit components.
    ///
    /// With a snapshot path, the snapshot is loaded; a corrupt snapshot, or
    /// one built for another dimension, is discarded and the index is rebuilt
    /// from the store. So is any snapshot that disagrees with the stored
    /// embeddings, such as a missing one or one whose last save failed.
    pub async fn assemble(
        config: KnowledgeBaseConfig,
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn EmbeddingProvider>,
        generator: Option<AnswerGenerator>,
        snapshot_path: Option<PathBuf>,
    ) -> AppResult<Self> {
        config.validate()?;
        let dimension = config.embedding_dim;
        let embeddings = EmbeddingEngine::new(provider, dimension)?;

        let (index, mut recover) = match snapshot_path {
            Some(path) => match IndexHandle::load(&path, dimension) {
                Ok(handle) => (handle, false),
                Err(e @ (IndexError::CorruptSnapshot(_) | IndexError::DimensionMismatch { .. })) => {
                    warn!("Discarding unusable index snapshot {:?}: {}", path, e);
                    (IndexHandle::new(VectorIndex::new(dimension), Some(path)), true)
                }
                Err(e) => return Err(e.into()),
            },
            None => (IndexHandle::in_memory(dimension), false),
        };
        let index = Arc::new(index);

        let orchestrator = QueryOrchestrator::new(
            Arc::clone(&index),
            Arc::clone(&store),
            embeddings.clone(),
            generator,
            &config,
        );

        let kb = Self {
            config,
            store,
            index,
            embeddings,
            orchestrator,
            locks: DocumentLocks::new(),
            lifecycle: RwLock::new(()),
        };

        if !recover && !kb.index_matches_store().await? {
            warn!("Index snapshot is out of date with the store, rebuilding");
            recover = true;
        }
        if recover {
            kb.rebuild_index_from_store().await?;
        }

        Ok(kb)
    }

    pub fn config(&self) -> &KnowledgeBaseConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn generation_enabled(&self) -> bool {
        self.orchestrator.generation_enabled()
    }

    /// Store, chunk, embed and index a new document.
    #[instrument(skip(self, text, tags, extra_metadata))]
    pub async fn upload_document(
        &self,
        title: &str,
        file_type: &str,
        text: &str,
        tags: Vec<String>,
        extra_metadata: Value,
    ) -> AppResult<IngestStats> {
        let start = Instant::now();
        if title.trim().is_empty() {
            return Err(AppError::InvalidInput("Title is required".to_string()));
        }

        let _lifecycle = self.lifecycle.read().await;
        // Fresh ids cannot collide, so no per-document lock is needed
        let document = Document::new(title.trim(), file_type, text, tags);
        info!("Processing document upload: {} ({})", document.title, file_type);

        // Embed before writing anything so an embedding failure leaves no trace
        let chunks = self.prepare_chunks(&document, text, &extra_metadata).await?;

        self.store.create_document(&document).await?;
        if let Err(e) = self.store.create_chunks_bulk(&chunks).await {
            warn!("Storing chunks for {} failed, removing document: {}", document.id, e);
            self.store.delete_document(&document.id).await?;
            return Err(e);
        }
        self.index_chunks(&chunks).await?;

        let duration = start.elapsed();
        info!(
            "Document {} processed: {} chunks in {:.2}s",
            document.id,
            chunks.len(),
            duration.as_secs_f64()
        );

        Ok(IngestStats {
            document,
            chunks_count: chunks.len(),
            duration_secs: duration.as_secs_f64(),
        })
    }

    /// Extract a file and upload it. The title defaults to the file stem.
    pub async fn upload_file(
        &self,
        path: &Path,
        title: Option<&str>,
        tags: Vec<String>,
    ) -> AppResult<IngestStats> {
        let (file_type, extracted) = read_file(path)?;
        let title = match title {
            Some(title) => title.to_string(),
            None => file_stem(path),
        };

        self.upload_document(&title, file_type.as_str(), &extracted.text, tags, extracted.metadata)
            .await
    }

    /// Apply `update` and re-process the document's chunks.
    ///
    /// Replacement chunks are embedded before the old ones are touched, so a
    /// failing embedding service leaves the document as it was.
    #[instrument(skip(self, update))]
    pub async fn update_document(&self, id: &str, update: DocumentUpdate) -> AppResult<IngestStats> {
        let start = Instant::now();
        let _lifecycle = self.lifecycle.read().await;
        let _guard = self.locks.acquire(id).await;

        let mut document = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Document {}", id)))?;
        info!("Updating document: {}", id);

        if let Some(title) = update.title.filter(|t| !t.trim().is_empty()) {
            document.title = title.trim().to_string();
        }
        if let Some(tags) = update.tags {
            document.tags = tags;
        }
        let extra_metadata = match update.content {
            Some((text, metadata)) => {
                document.content = text;
                metadata
            }
            None => json!({}),
        };
        document.updated_at = chrono::Utc::now();

        let chunks = self
            .prepare_chunks(&document, &document.content, &extra_metadata)
            .await?;

        let old_ids: Vec<String> = self
            .store
            .get_chunks_by_document(id)
            .await?
            .iter()
            .map(Chunk::external_id)
            .collect();
        self.index.remove_batch(&old_ids).await?;
        self.store.delete_chunks_by_document(id).await?;

        self.store.update_document(&document).await?;
        self.store.create_chunks_bulk(&chunks).await?;
        self.index_chunks(&chunks).await?;

        info!("Document {} updated with {} chunks", id, chunks.len());
        Ok(IngestStats {
            document,
            chunks_count: chunks.len(),
            duration_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// Replace a document's content with a file's extracted text.
    pub async fn update_from_file(
        &self,
        id: &str,
        path: &Path,
        title: Option<String>,
        tags: Option<Vec<String>>,
    ) -> AppResult<IngestStats> {
        let (_, extracted) = read_file(path)?;
        let update = DocumentUpdate {
            title,
            tags,
            content: Some((extracted.text, extracted.metadata)),
        };
        self.update_document(id, update).await
    }

    /// Delete a document and its chunks. Returns the number of chunks removed.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, id: &str) -> AppResult<usize> {
        let _lifecycle = self.lifecycle.read().await;
        let _guard = self.locks.acquire(id).await;

        if self.store.get_document(id).await?.is_none() {
            return Err(AppError::NotFound(format!("Document {}", id)));
        }

        let ids: Vec<String> = self
            .store
            .get_chunks_by_document(id)
            .await?
            .iter()
            .map(Chunk::external_id)
            .collect();
        self.index.remove_batch(&ids).await?;

        if !self.store.delete_document(id).await? {
            return Err(AppError::NotFound(format!("Document {}", id)));
        }

        info!("Document {} and {} chunks deleted", id, ids.len());
        Ok(ids.len())
    }

    /// All documents with their chunk counts, oldest first.
    pub async fn list_documents(&self) -> AppResult<Vec<DocumentSummary>> {
        let documents = self.store.list_documents().await?;
        let counts = self.store.chunk_counts().await?;

        Ok(documents
            .into_iter()
            .map(|document| {
                let chunks_count = counts.get(&document.id).copied().unwrap_or(0);
                DocumentSummary {
                    document,
                    chunks_count,
                }
            })
            .collect())
    }

    pub async fn get_document(&self, id: &str) -> AppResult<DocumentDetails> {
        let document = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Document {}", id)))?;
        let chunks = self.store.get_chunks_by_document(id).await?;
        Ok(DocumentDetails { document, chunks })
    }

    /// Replace the index contents with every embedding held by the store.
    ///
    /// Returns the number of vectors loaded. Waits for in-flight uploads,
    /// updates and deletes, and holds new ones off until the index is swapped.
    #[instrument(skip(self))]
    pub async fn rebuild_index_from_store(&self) -> AppResult<usize> {
        let _lifecycle = self.lifecycle.write().await;
        let chunks = self.store.all_chunks().await?;
        let total = chunks.len();

        let pairs: Vec<(String, Vec<f32>)> = chunks
            .into_iter()
            .filter_map(|chunk| {
                let id = chunk.external_id();
                chunk.embedding.map(|embedding| (id, embedding))
            })
            .collect();
        if pairs.len() < total {
            warn!("{} stored chunks have no embedding", total - pairs.len());
        }

        let loaded = self.index.rebuild_from(pairs).await?;
        info!("Rebuilt index from store: {} of {} chunks", loaded, total);
        Ok(loaded)
    }

    pub async fn query(&self, options: &QueryOptions) -> AppResult<QueryResponse> {
        self.orchestrator.ask(options).await
    }

    /// Totals, and whether the index holds exactly the stored embeddings.
    pub async fn stats(&self) -> AppResult<BaseStats> {
        let (documents_count, chunks_count) = self.store.counts().await?;
        let in_sync = self.index_matches_store().await?;

        let index = self.index.read().await;
        Ok(BaseStats {
            documents_count,
            chunks_count,
            indexed_vectors: index.size(),
            dimension: index.dimension(),
            in_sync,
        })
    }

    /// Whether the index holds exactly the ids of the stored embeddings.
    async fn index_matches_store(&self) -> AppResult<bool> {
        let stored: HashSet<String> = self
            .store
            .all_chunks()
            .await?
            .iter()
            .filter(|chunk| chunk.embedding.is_some())
            .map(Chunk::external_id)
            .collect();

        let index = self.index.read().await;
        Ok(index.size() == stored.len() && index.ids().all(|id| stored.contains(id)))
    }

    /// Chunk and embed `text` for `document`.
    async fn prepare_chunks(
        &self,
        document: &Document,
        text: &str,
        extra_metadata: &Value,
    ) -> AppResult<Vec<Chunk>> {
        let mut metadata = json!({
            "title": document.title,
            "fileType": document.doc_type,
        });
        if let (Some(base), Some(extra)) = (metadata.as_object_mut(), extra_metadata.as_object()) {
            for (key, value) in extra {
                base.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let candidates = chunk_text(text, &ChunkOptions::from(&self.config), &metadata);
        if candidates.is_empty() {
            warn!("Document {} has no text to index", document.id);
            return Ok(Vec::new());
        }
        debug!("Created {} chunks for document {}", candidates.len(), document.id);

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embeddings.embed_texts(&texts).await?;

        Ok(candidates
            .into_iter()
            .zip(embeddings)
            .map(|(candidate, embedding)| candidate.into_chunk(&document.id, embedding))
            .collect())
    }

    async fn index_chunks(&self, chunks: &[Chunk]) -> AppResult<()> {
        let entries: Vec<(String, Vec<f32>)> = chunks
            .iter()
            .filter_map(|c| c.embedding.clone().map(|e| (c.external_id(), e)))
            .collect();
        if entries.is_empty() {
            return Ok(());
        }

        let report = self.index.insert_batch(entries).await?;
        if !report.skipped.is_empty() {
            warn!("{} chunk ids were already indexed: {:?}", report.skipped.len(), report.skipped);
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> AppResult<(FileType, crate::parser::ExtractedText)> {
    let file_type = FileType::from_path(path)?;
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extracted = extract_text(&bytes, file_type, &file_name)?;
    Ok((file_type, extracted))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}
