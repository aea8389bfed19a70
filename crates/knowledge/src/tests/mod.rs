//! End-to-end tests for the knowledge base service.

mod lifecycle;

use crate::config::KnowledgeBaseConfig;
use crate::embeddings::providers::MockProvider;
use crate::embeddings::EmbeddingProvider;
use crate::rag::AnswerGenerator;
use crate::store::{DocumentStore, MemoryStore};
use crate::KnowledgeBase;
use docqa_core::{AppError, AppResult};
use docqa_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) const DIM: usize = 64;

pub(crate) const VACATION: &str = "Our vacation policy grants twenty days of paid leave each year.";
pub(crate) const CLUSTERS: &str = "Kubernetes clusters need monitoring and alerting.";

pub(crate) fn test_config() -> KnowledgeBaseConfig {
    KnowledgeBaseConfig {
        chunk_size: 120,
        chunk_overlap: 20,
        embedding_dim: DIM,
        ..Default::default()
    }
}

pub(crate) async fn memory_kb(generator: Option<AnswerGenerator>) -> KnowledgeBase {
    with_config(test_config(), generator).await
}

pub(crate) async fn with_config(
    config: KnowledgeBaseConfig,
    generator: Option<AnswerGenerator>,
) -> KnowledgeBase {
    KnowledgeBase::assemble(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MockProvider::new(DIM)),
        generator,
        None,
    )
    .await
    .unwrap()
}

pub(crate) async fn persistent_kb(
    store: Arc<dyn DocumentStore>,
    snapshot: PathBuf,
) -> AppResult<KnowledgeBase> {
    KnowledgeBase::assemble(
        test_config(),
        store,
        Arc::new(MockProvider::new(DIM)),
        None,
        Some(snapshot),
    )
    .await
}

/// Replies with a fixed completion.
pub(crate) struct FixedLlm(pub &'static str);

#[async_trait::async_trait]
impl LlmClient for FixedLlm {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        Ok(LlmResponse {
            content: self.0.to_string(),
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

/// Always fails, like an unreachable backend.
pub(crate) struct BrokenLlm;

#[async_trait::async_trait]
impl LlmClient for BrokenLlm {
    fn provider_name(&self) -> &str {
        "broken"
    }

    async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
        Err(AppError::Llm("connection refused".to_string()))
    }
}

/// Embedding provider whose model is down.
#[derive(Debug)]
pub(crate) struct OfflineEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for OfflineEmbedder {
    fn provider_name(&self) -> &str {
        "offline"
    }

    fn model_name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Err(AppError::Embedding("model not loaded".to_string()))
    }
}

pub(crate) fn generator(client: Arc<dyn LlmClient>) -> AnswerGenerator {
    AnswerGenerator::new(client, "llama3", &test_config())
}
