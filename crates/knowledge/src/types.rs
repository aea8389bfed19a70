//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use docqa_core::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External identifier of one chunk's vector: `"{document_id}:{local_index}"`.
///
/// Deterministic and reconstructible from its two parts alone; this is the
/// only key the vector index understands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    pub document_id: String,
    pub local_index: u32,
}

impl ChunkId {
    pub fn new(document_id: impl Into<String>, local_index: u32) -> Self {
        Self {
            document_id: document_id.into(),
            local_index,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document_id, self.local_index)
    }
}

impl FromStr for ChunkId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (document_id, index) = s
            .rsplit_once(':')
            .ok_or_else(|| AppError::InvalidInput(format!("Malformed chunk id '{}'", s)))?;

        if document_id.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Chunk id '{}' has no document part",
                s
            )));
        }

        let local_index = index.parse::<u32>().map_err(|_| {
            AppError::InvalidInput(format!("Chunk id '{}' has a non-numeric index", s))
        })?;

        Ok(Self::new(document_id, local_index))
    }
}

/// An uploaded document as held by the document store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique document identifier (UUID v4)
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// Source file type ("txt", "md", "html", ...)
    pub doc_type: String,

    /// Full extracted text
    pub content: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document with a fresh identifier.
    pub fn new(
        title: impl Into<String>,
        doc_type: impl Into<String>,
        content: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            doc_type: doc_type.into(),
            content: content.into(),
            tags,
            created_at: now,
            updated_at: now,
        }
    }

    /// Descriptive fields attached to query results.
    pub fn descriptor(&self) -> DocumentDescriptor {
        DocumentDescriptor {
            id: self.id.clone(),
            title: self.title.clone(),
            doc_type: self.doc_type.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// The subset of a document shown next to a retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentDescriptor {
    pub id: String,
    pub title: String,
    pub doc_type: String,
    pub tags: Vec<String>,
}

/// A text chunk as held by the document store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Owning document ID
    pub document_id: String,

    /// Zero-based position among the document's chunks
    pub local_index: u32,

    /// Trimmed, non-empty text content
    pub text: String,

    /// Embedding vector (unit length), absent before embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Document-level attributes merged with chunk-local position markers
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Chunk {
    /// The identifier this chunk's vector is indexed under.
    pub fn chunk_id(&self) -> ChunkId {
        ChunkId::new(self.document_id.clone(), self.local_index)
    }

    /// String form of [`Chunk::chunk_id`].
    pub fn external_id(&self) -> String {
        self.chunk_id().to_string()
    }
}

/// Chunker output before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCandidate {
    pub local_index: u32,
    pub text: String,
    /// Character offset of the span start in the normalized text
    pub start: usize,
    /// Character offset one past the span end in the normalized text
    pub end: usize,
    pub metadata: serde_json::Value,
}

impl ChunkCandidate {
    /// Attach the owning document and embedding.
    pub fn into_chunk(self, document_id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            document_id: document_id.to_string(),
            local_index: self.local_index,
            text: self.text,
            embedding: Some(embedding),
            metadata: self.metadata,
        }
    }
}

/// A document listed together with its chunk count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    #[serde(flatten)]
    pub document: Document,
    pub chunks_count: usize,
}

/// A document with all of its chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDetails {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

/// Changes applied by a document update. Unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Replacement text and its extraction metadata
    pub content: Option<(String, serde_json::Value)>,
}

/// Result of processing (uploading or re-processing) a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStats {
    pub document: Document,
    pub chunks_count: usize,
    pub duration_secs: f64,
}

/// Statistics for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseStats {
    pub documents_count: usize,
    pub chunks_count: usize,
    pub indexed_vectors: usize,
    pub dimension: usize,
    /// Whether every stored chunk is indexed and nothing else is
    pub in_sync: bool,
}
