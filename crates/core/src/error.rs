//! Error types for docqa.
//!
//! This module defines a unified error enum that covers all error categories
//! in the application: configuration, I/O, embedding and generation backends,
//! the knowledge store, and user input.

use thiserror::Error;

/// Unified error type for docqa.
///
/// All fallible functions outside the vector index return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM transport/provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding service failures (model or input)
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Answer generation failures
    #[error("Generation error: {0}")]
    Generation(String),

    /// Knowledge base and vector index errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Document/chunk store errors
    #[error("Store error: {0}")]
    Store(String),

    /// A requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
