//! Offline embedding provider built from hashed word trigrams.

use crate::embeddings::normalize;
use crate::embeddings::provider::EmbeddingProvider;
use docqa_core::{AppError, AppResult};
use std::collections::{BTreeMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them",
];

/// Deterministic, content-dependent embeddings for tests and offline use.
///
/// Texts sharing words share dimensions, so lexical overlap shows up as
/// similarity. Not a semantic model.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, bytes: &[u8], multiplier: u64) -> usize {
        let hash = bytes
            .iter()
            .fold(0u64, |acc, &b| acc.wrapping_mul(multiplier).wrapping_add(b as u64));
        (hash as usize) % self.dimensions
    }

    fn generate(&self, text: &str) -> AppResult<Vec<f32>> {
        let lower = text.to_lowercase();
        if lower.trim().is_empty() {
            return Err(AppError::Embedding("Cannot embed empty text".to_string()));
        }

        let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut words: Vec<&str> = tokens
            .iter()
            .copied()
            .filter(|w| !stop_words.contains(w) && w.chars().count() > 2)
            .collect();
        if words.is_empty() {
            words = tokens;
        }

        let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for word in &words {
            *frequency.entry(*word).or_insert(0) += 1;
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        for (word, freq) in &frequency {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                embedding[self.bucket(trigram.as_bytes(), 37)] += (*freq as f32).sqrt();
            }
            embedding[self.bucket(word.as_bytes(), 31)] += *freq as f32;
        }

        // Punctuation-only input still needs a direction
        if embedding.iter().all(|&x| x == 0.0) {
            embedding[self.bucket(lower.trim().as_bytes(), 31)] = 1.0;
        }

        normalize(&mut embedding);
        Ok(embedding)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.generate(text)).collect()
    }
}
