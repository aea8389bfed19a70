//! Query command handler.

use super::print_json;
use clap::Args;
use docqa_core::{config::AppConfig, AppResult};
use docqa_knowledge::{KnowledgeBase, QueryOptions};

/// Ask a question about the uploaded documents
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Question text
    pub question: String,

    /// Number of chunks to retrieve (1-20)
    #[arg(short = 'k', long, default_value = "5")]
    pub top_k: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl QueryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing query command");

        let kb = KnowledgeBase::open(config).await?;
        let options = QueryOptions::new(self.question.clone()).with_k(self.top_k);
        let response = kb.query(&options).await?;

        tracing::debug!(
            "Query response: {} chunks, generated={}",
            response.chunks.len(),
            response.used_generation
        );

        if self.json {
            return print_json(&response);
        }

        println!("Answer:");
        println!("{}", response.answer);
        println!();

        if let Some(message) = &response.message {
            println!("({})", message);
            println!();
        }

        if response.chunks.is_empty() {
            println!("Sources: (no sources available)");
        } else {
            println!("Sources:");
            for chunk in &response.chunks {
                println!(
                    "- {} (relevance {:.3}, chunk {})",
                    chunk.source_title(),
                    chunk.score,
                    chunk.external_id
                );
            }
        }

        Ok(())
    }
}
