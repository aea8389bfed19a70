//! Grounded answer generation through an LLM.

use crate::config::KnowledgeBaseConfig;
use crate::rag::types::ResolvedChunk;
use docqa_core::{AppError, AppResult};
use docqa_llm::{LlmClient, LlmRequest};
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions using the provided context.\n\n\
Instructions:\n\
- Answer directly and naturally, without introductions like \"Based on the provided context\"\n\
- Use only the information from the context\n\
- If the context does not contain the answer, say you don't have that information; do not make up answers\n\
- Keep answers concise and well structured\n";

/// Composes answers from retrieved chunks with a generation backend.
#[derive(Clone)]
pub struct AnswerGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    context_chunks: usize,
}

impl AnswerGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, config: &KnowledgeBaseConfig) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            context_chunks: config.context_chunks,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    /// Ask the backend to answer `question` from the top chunks.
    ///
    /// An empty completion is reported as a `Generation` error.
    pub async fn generate(&self, question: &str, chunks: &[ResolvedChunk]) -> AppResult<String> {
        let context = self.build_context(chunks);
        let prompt = format!("Context:\n{}\n\nQuestion: {}\n\nAnswer:", context, question);

        let request = LlmRequest::new(prompt, self.model.clone())
            .with_system(SYSTEM_PROMPT)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        tracing::debug!(
            "Generating answer with {} (model {}, {} context chunks)",
            self.client.provider_name(),
            self.model,
            chunks.len().min(self.context_chunks)
        );

        let response = self
            .client
            .complete(&request)
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        let answer = response.content.trim();
        if answer.is_empty() {
            return Err(AppError::Generation("Empty completion".to_string()));
        }
        Ok(answer.to_string())
    }

    /// Label each of the top chunks with its source and score.
    fn build_context(&self, chunks: &[ResolvedChunk]) -> String {
        if chunks.is_empty() {
            return "No relevant information found.".to_string();
        }

        chunks
            .iter()
            .take(self.context_chunks)
            .map(|chunk| {
                format!(
                    "[{}] (Relevance: {:.3}):\n{}",
                    chunk.source_title(),
                    chunk.score,
                    chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentDescriptor;
    use docqa_llm::{LlmResponse, LlmUsage};
    use std::sync::Mutex;

    /// Records the last request and replies with a fixed completion.
    struct RecordingClient {
        reply: String,
        last: Mutex<Option<LlmRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for RecordingClient {
        fn provider_name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok(LlmResponse {
                content: self.reply.clone(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
            })
        }
    }

    fn chunk(title: Option<&str>, text: &str, score: f32) -> ResolvedChunk {
        ResolvedChunk {
            external_id: "d:0".to_string(),
            document_id: "d".to_string(),
            local_index: 0,
            text: text.to_string(),
            score,
            metadata: serde_json::json!({}),
            document: title.map(|t| DocumentDescriptor {
                id: "d".to_string(),
                title: t.to_string(),
                doc_type: "txt".to_string(),
                tags: vec![],
            }),
        }
    }

    fn generator(reply: &str) -> (Arc<RecordingClient>, AnswerGenerator) {
        let client = Arc::new(RecordingClient {
            reply: reply.to_string(),
            last: Mutex::new(None),
        });
        let config = KnowledgeBaseConfig {
            temperature: 0.2,
            max_tokens: 256,
            context_chunks: 2,
            ..Default::default()
        };
        let generator = AnswerGenerator::new(client.clone(), "llama3", &config);
        (client, generator)
    }

    #[test]
    fn test_context_format() {
        let (_, generator) = generator("ok");
        let context = generator.build_context(&[
            chunk(Some("Handbook"), "Twenty days of leave.", 0.8123),
            chunk(None, "Second.", 0.5),
            chunk(Some("Ignored"), "Past the context limit.", 0.1),
        ]);

        assert_eq!(
            context,
            "[Handbook] (Relevance: 0.812):\nTwenty days of leave.\n\n---\n\n[Unknown Document] (Relevance: 0.500):\nSecond."
        );
    }

    #[tokio::test]
    async fn test_generate_uses_config() {
        let (client, generator) = generator("  Twenty days.  ");
        let answer = generator
            .generate("How much leave?", &[chunk(Some("Handbook"), "Twenty days.", 0.9)])
            .await
            .unwrap();

        assert_eq!(answer, "Twenty days.");
        let request = client.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.model, "llama3");
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(256));
        assert!(request.prompt.contains("Question: How much leave?"));
        assert!(request.system.is_some());
    }

    #[tokio::test]
    async fn test_empty_completion_is_error() {
        let (_, generator) = generator("   ");
        let result = generator.generate("q", &[chunk(None, "t", 0.1)]).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }
}
