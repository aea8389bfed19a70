//! Question answering over the vector index.
//!
//! Embeds the question, searches the index, resolves hits back to stored
//! chunks and answers either through the generation backend or, when that
//! is absent or fails, with an excerpt of the best chunk.

use crate::config::KnowledgeBaseConfig;
use crate::embeddings::EmbeddingEngine;
use crate::index_handle::IndexHandle;
use crate::rag::generator::AnswerGenerator;
use crate::rag::types::{QueryOptions, QueryResponse, ResolvedChunk, NO_CHUNKS_ANSWER};
use crate::store::DocumentStore;
use crate::types::ChunkId;
use crate::vector_index::SearchHit;
use docqa_core::{AppError, AppResult};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Stateless per query; holds only shared handles.
pub struct QueryOrchestrator {
    index: Arc<IndexHandle>,
    store: Arc<dyn DocumentStore>,
    embeddings: EmbeddingEngine,
    generator: Option<AnswerGenerator>,
    extractive_budget: usize,
    relevance_floor: Option<f32>,
}

impl QueryOrchestrator {
    pub fn new(
        index: Arc<IndexHandle>,
        store: Arc<dyn DocumentStore>,
        embeddings: EmbeddingEngine,
        generator: Option<AnswerGenerator>,
        config: &KnowledgeBaseConfig,
    ) -> Self {
        Self {
            index,
            store,
            embeddings,
            generator,
            extractive_budget: config.extractive_budget,
            relevance_floor: config.relevance_floor,
        }
    }

    pub fn generation_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Answer a question.
    ///
    /// An empty search result is a normal response, not an error. Embedding
    /// failures abort the query; generation failures fall back to an
    /// extractive answer.
    #[instrument(skip(self, options), fields(k = options.effective_k()))]
    pub async fn ask(&self, options: &QueryOptions) -> AppResult<QueryResponse> {
        let query = options.query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput(
                "Query is required and must be a non-empty string".to_string(),
            ));
        }

        let k = options.effective_k();
        info!("Query received: \"{}\" (k={})", query, k);

        let embedding = self.embeddings.embed_query(query).await?;
        let hits = self.index.search(&embedding, k).await?;

        if hits.is_empty() {
            info!("No indexed chunks matched the query");
            return Ok(QueryResponse::no_results(query));
        }

        let mut chunks = self.resolve(hits).await?;

        if let Some(floor) = self.relevance_floor {
            let before = chunks.len();
            chunks.retain(|chunk| chunk.score >= floor);
            debug!(
                "Relevance floor {:.2} kept {}/{} chunks",
                floor,
                chunks.len(),
                before
            );
        }

        if chunks.is_empty() {
            return Ok(QueryResponse {
                query: query.to_string(),
                answer: NO_CHUNKS_ANSWER.to_string(),
                chunks,
                used_generation: false,
                message: Some("No retrieved chunks could be resolved".to_string()),
            });
        }

        let (answer, used_generation, message) = match &self.generator {
            Some(generator) => match generator.generate(query, &chunks).await {
                Ok(answer) => (answer, true, None),
                Err(e) => {
                    warn!(
                        "Generation via {} failed, using extractive answer: {}",
                        generator.provider_name(),
                        e
                    );
                    (
                        extractive_answer(&chunks, self.extractive_budget),
                        false,
                        Some("Generation failed; showing the best matching excerpt".to_string()),
                    )
                }
            },
            None => (extractive_answer(&chunks, self.extractive_budget), false, None),
        };

        info!(
            "Answered from {} chunks (generated: {})",
            chunks.len(),
            used_generation
        );

        Ok(QueryResponse {
            query: query.to_string(),
            answer,
            chunks,
            used_generation,
            message,
        })
    }

    /// Resolve hits concurrently, keeping search order and dropping any
    /// that no longer point at a stored chunk.
    async fn resolve(&self, hits: Vec<SearchHit>) -> AppResult<Vec<ResolvedChunk>> {
        let total = hits.len();
        let resolved = join_all(hits.into_iter().map(|hit| self.resolve_hit(hit))).await;

        let chunks: Vec<ResolvedChunk> = resolved
            .into_iter()
            .collect::<AppResult<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        if chunks.len() < total {
            debug!("Dropped {} unresolved hits", total - chunks.len());
        }
        Ok(chunks)
    }

    async fn resolve_hit(&self, hit: SearchHit) -> AppResult<Option<ResolvedChunk>> {
        let chunk_id: ChunkId = match hit.id.parse() {
            Ok(id) => id,
            Err(e) => {
                warn!("Skipping hit with malformed id '{}': {}", hit.id, e);
                return Ok(None);
            }
        };

        let Some(chunk) = self.store.get_chunk_by_external_id(&chunk_id).await? else {
            return Ok(None);
        };
        let document = self
            .store
            .get_document(&chunk.document_id)
            .await?
            .map(|d| d.descriptor());

        Ok(Some(ResolvedChunk {
            external_id: hit.id,
            document_id: chunk.document_id,
            local_index: chunk.local_index,
            text: chunk.text,
            score: hit.score,
            metadata: chunk.metadata,
            document,
        }))
    }
}

/// The best chunk's text, cut to `budget` characters with a trailing `...`.
pub fn extractive_answer(chunks: &[ResolvedChunk], budget: usize) -> String {
    let Some(top) = chunks.first() else {
        return NO_CHUNKS_ANSWER.to_string();
    };

    let text = top.text.trim();
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
