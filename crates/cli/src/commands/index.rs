//! Vector index maintenance command handlers.

use super::print_json;
use clap::{Args, Subcommand};
use docqa_core::{config::AppConfig, AppResult};
use docqa_knowledge::KnowledgeBase;

/// Vector index maintenance
#[derive(Args, Debug)]
pub struct IndexCommand {
    #[command(subcommand)]
    pub action: IndexAction,
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Rebuild the index from the stored chunk embeddings
    Rebuild(IndexRebuildCommand),
    /// Show document, chunk and index statistics
    Stats(IndexStatsCommand),
}

#[derive(Args, Debug)]
pub struct IndexRebuildCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexRebuildCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing index rebuild command");

        let kb = KnowledgeBase::open(config).await?;
        let loaded = kb.rebuild_index_from_store().await?;

        if self.json {
            print_json(&serde_json::json!({ "indexedVectors": loaded }))?;
        } else {
            println!("Rebuilt index with {} vectors", loaded);
        }

        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct IndexStatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexStatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let kb = KnowledgeBase::open(config).await?;
        let stats = kb.stats().await?;

        if self.json {
            return print_json(&stats);
        }

        println!("Knowledge base: {}", config.workspace.display());
        println!("  Documents: {}", stats.documents_count);
        println!("  Chunks: {}", stats.chunks_count);
        println!("  Indexed vectors: {}", stats.indexed_vectors);
        println!("  Dimension: {}", stats.dimension);
        println!(
            "  In sync: {}",
            if stats.in_sync {
                "yes"
            } else {
                "no (run `docqa index rebuild`)"
            }
        );
        println!(
            "  Generation: {}",
            if kb.generation_enabled() {
                config.provider.as_str()
            } else {
                "off (extractive answers)"
            }
        );

        Ok(())
    }
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            IndexAction::Rebuild(cmd) => cmd.execute(config).await,
            IndexAction::Stats(cmd) => cmd.execute(config).await,
        }
    }
}
