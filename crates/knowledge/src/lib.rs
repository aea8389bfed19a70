//! Document question answering over a local vector index.
//!
//! Documents are split into overlapping chunks, embedded, stored in a
//! [`store::DocumentStore`] and indexed in an exact inner-product
//! [`VectorIndex`]. Questions are answered from the best matching chunks,
//! through an LLM when one is configured and extractively otherwise.
//!
//! [`KnowledgeBase`] ties the pieces together.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod index_handle;
pub mod knowledge_base;
pub mod locks;
pub mod parser;
pub mod persistence;
pub mod rag;
pub mod store;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::KnowledgeBaseConfig;
pub use index_handle::IndexHandle;
pub use knowledge_base::KnowledgeBase;
pub use rag::{QueryOptions, QueryResponse, ResolvedChunk};
pub use types::{
    BaseStats, Chunk, ChunkId, Document, DocumentDescriptor, DocumentDetails, DocumentSummary,
    DocumentUpdate, IngestStats,
};
pub use vector_index::{IndexError, SearchHit, VectorIndex};
