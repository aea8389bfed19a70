//! Embedding engine for the knowledge base.
//!
//! Wraps a provider and enforces the contract the index relies on: one
//! vector per input, no empty inputs, and every vector of the configured
//! dimension.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};

use docqa_core::{AppError, AppResult};
use std::sync::Arc;

/// Scale `vector` to unit length in place. Zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Validated access to an [`EmbeddingProvider`].
#[derive(Clone)]
pub struct EmbeddingEngine {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
}

impl EmbeddingEngine {
    /// Wrap `provider`, expecting vectors of `dimensions` components.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimensions: usize) -> AppResult<Self> {
        if provider.dimensions() != dimensions {
            return Err(AppError::Embedding(format!(
                "Provider '{}' produces {} dimensions, index expects {}",
                provider.provider_name(),
                provider.dimensions(),
                dimensions
            )));
        }
        Ok(Self {
            provider,
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed multiple texts.
    pub async fn embed_texts(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(AppError::Embedding(format!(
                "Cannot embed empty text (input {})",
                i
            )));
        }

        tracing::debug!(
            "Embedding {} texts using provider '{}' (model: {})",
            texts.len(),
            self.provider.provider_name(),
            self.provider.model_name()
        );

        let embeddings = self.provider.embed_batch(texts).await?;

        if embeddings.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(AppError::Embedding(format!(
                "Embedding has {} dimensions, expected {}",
                bad.len(),
                self.dimensions
            )));
        }

        Ok(embeddings)
    }

    /// Embed a single text, typically a question.
    pub async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}
