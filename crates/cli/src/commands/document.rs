//! Document lifecycle command handlers.

use super::print_json;
use clap::Args;
use docqa_core::{config::AppConfig, AppError, AppResult};
use docqa_knowledge::parser::FileType;
use docqa_knowledge::{DocumentUpdate, IngestStats, KnowledgeBase};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Upload files or directories
#[derive(Args, Debug)]
pub struct UploadCommand {
    /// Files or directories to upload (txt, md, html)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Document title (single file only; defaults to the file name)
    #[arg(long)]
    pub title: Option<String>,

    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl UploadCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let files = collect_files(&self.paths)?;
        if self.title.is_some() && files.len() > 1 {
            return Err(AppError::InvalidInput(
                "--title can only be used with a single file".to_string(),
            ));
        }

        tracing::info!("Executing upload command for {} files", files.len());
        let kb = KnowledgeBase::open(config).await?;
        let tags = clean_tags(&self.tags);

        let mut uploaded: Vec<IngestStats> = Vec::new();
        let mut failed = 0usize;
        for file in &files {
            match kb.upload_file(file, self.title.as_deref(), tags.clone()).await {
                Ok(stats) => uploaded.push(stats),
                Err(e) => {
                    tracing::warn!("Failed to upload {:?}: {}", file, e);
                    eprintln!("Skipped {}: {}", file.display(), e);
                    failed += 1;
                }
            }
        }

        if uploaded.is_empty() && failed > 0 {
            return Err(AppError::InvalidInput("No files could be uploaded".to_string()));
        }

        if self.json {
            print_json(&uploaded)?;
        } else {
            for stats in &uploaded {
                println!(
                    "Uploaded {} ({}) as {}: {} chunks in {:.2}s",
                    stats.document.title,
                    stats.document.doc_type,
                    stats.document.id,
                    stats.chunks_count,
                    stats.duration_secs
                );
            }
            if failed > 0 {
                println!("{} files skipped", failed);
            }
        }

        Ok(())
    }
}

/// Update a document's title, tags or content
#[derive(Args, Debug)]
pub struct UpdateCommand {
    /// Document ID
    pub id: String,

    /// Replace the content with this file
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New comma-separated tags (replaces existing tags)
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl UpdateCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing update command for document {}", self.id);
        let kb = KnowledgeBase::open(config).await?;
        let tags = self.tags.as_deref().map(clean_tags);

        let stats = match &self.file {
            Some(file) => {
                kb.update_from_file(&self.id, file, self.title.clone(), tags)
                    .await?
            }
            None => {
                let update = DocumentUpdate {
                    title: self.title.clone(),
                    tags,
                    content: None,
                };
                kb.update_document(&self.id, update).await?
            }
        };

        if self.json {
            print_json(&stats)?;
        } else {
            println!(
                "Updated {} ({}): {} chunks",
                stats.document.title, stats.document.id, stats.chunks_count
            );
        }

        Ok(())
    }
}

/// Delete a document and its chunks
#[derive(Args, Debug)]
pub struct DeleteCommand {
    /// Document ID
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl DeleteCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing delete command for document {}", self.id);
        let kb = KnowledgeBase::open(config).await?;
        let deleted_chunks = kb.delete_document(&self.id).await?;

        if self.json {
            print_json(&serde_json::json!({
                "id": self.id,
                "deletedChunks": deleted_chunks,
            }))?;
        } else {
            println!("Deleted document {} ({} chunks)", self.id, deleted_chunks);
        }

        Ok(())
    }
}

/// List documents
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let kb = KnowledgeBase::open(config).await?;
        let documents = kb.list_documents().await?;

        if self.json {
            print_json(&documents)?;
            return Ok(());
        }

        if documents.is_empty() {
            println!("No documents");
            return Ok(());
        }

        for summary in &documents {
            let doc = &summary.document;
            let tags = if doc.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", doc.tags.join(", "))
            };
            println!(
                "{}  {} ({}, {} chunks){}",
                doc.id, doc.title, doc.doc_type, summary.chunks_count, tags
            );
        }
        println!("{} documents", documents.len());

        Ok(())
    }
}

/// Show a document and its chunks
#[derive(Args, Debug)]
pub struct ShowCommand {
    /// Document ID
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ShowCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let kb = KnowledgeBase::open(config).await?;
        let details = kb.get_document(&self.id).await?;

        if self.json {
            print_json(&details)?;
            return Ok(());
        }

        let doc = &details.document;
        println!("{} ({})", doc.title, doc.id);
        println!("  Type: {}", doc.doc_type);
        if !doc.tags.is_empty() {
            println!("  Tags: {}", doc.tags.join(", "));
        }
        println!("  Created: {}", doc.created_at);
        println!("  Updated: {}", doc.updated_at);
        println!("  Chunks: {}", details.chunks.len());

        for chunk in &details.chunks {
            println!();
            println!("[{}] {}", chunk.external_id(), preview(&chunk.text, 120));
        }

        Ok(())
    }
}

/// Expand directories into the supported files beneath them.
fn collect_files(paths: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                if entry_path.is_file() && is_supported(entry_path) {
                    files.push(entry_path.to_path_buf());
                }
            }
        } else {
            return Err(AppError::NotFound(format!("{}", path.display())));
        }
    }

    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    FileType::from_path(path).is_ok()
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
