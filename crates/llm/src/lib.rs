//! Generation backend for docqa.
//!
//! This crate provides a provider-agnostic abstraction for asking a Large
//! Language Model to compose an answer. Providers share the [`LlmClient`]
//! trait; [`create_client`] resolves one from configuration.
//!
//! # Providers
//! - **Ollama**: local LLM runtime
//! - **OpenAI**: any OpenAI-compatible `/chat/completions` endpoint
//!
//! # Example
//! ```no_run
//! use docqa_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::ProviderType;
