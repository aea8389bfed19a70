//! Query request and response types.

use crate::types::DocumentDescriptor;
use serde::{Deserialize, Serialize};

/// Smallest and largest number of results a query may ask for.
pub const MIN_RESULTS: usize = 1;
pub const MAX_RESULTS: usize = 20;

/// Number of results when the caller does not say.
pub const DEFAULT_RESULTS: usize = 5;

/// Answer returned when the index has nothing to offer.
pub const NO_RESULTS_ANSWER: &str = "I couldn't find any relevant information to answer your question. \
     Please try rephrasing or ask about topics covered in the uploaded documents.";

/// Answer returned when every hit was dropped during resolution.
pub const NO_CHUNKS_ANSWER: &str =
    "I don't have any relevant information about that topic in the current knowledge base.";

/// Options for a single question.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub query: String,
    /// Requested result count, clamped to `[MIN_RESULTS, MAX_RESULTS]`
    pub k: usize,
}

impl QueryOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: DEFAULT_RESULTS,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// `k` clamped to the supported range.
    pub fn effective_k(&self) -> usize {
        self.k.clamp(MIN_RESULTS, MAX_RESULTS)
    }
}

/// A search hit resolved back to its stored chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedChunk {
    pub external_id: String,
    pub document_id: String,
    pub local_index: u32,
    pub text: String,
    /// Inner-product similarity reported by the index
    pub score: f32,
    pub metadata: serde_json::Value,
    /// Owning document, absent if it disappeared between lookups
    pub document: Option<DocumentDescriptor>,
}

impl ResolvedChunk {
    /// Title used to label the chunk in prompts and listings.
    pub fn source_title(&self) -> &str {
        self.document
            .as_ref()
            .map(|d| d.title.as_str())
            .unwrap_or("Unknown Document")
    }
}

/// Answer to a question, with the chunks it was drawn from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub chunks: Vec<ResolvedChunk>,
    /// Whether the answer came from the generation service
    pub used_generation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QueryResponse {
    /// Response for a query whose search came back empty.
    pub fn no_results(query: &str) -> Self {
        Self {
            query: query.to_string(),
            answer: NO_RESULTS_ANSWER.to_string(),
            chunks: Vec::new(),
            used_generation: false,
            message: Some("No relevant documents found".to_string()),
        }
    }
}
