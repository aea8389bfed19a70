//! Retrieval-augmented question answering.

pub mod ask;
pub mod generator;
pub mod types;

pub use ask::{extractive_answer, QueryOrchestrator};
pub use generator::AnswerGenerator;
pub use types::{QueryOptions, QueryResponse, ResolvedChunk};
