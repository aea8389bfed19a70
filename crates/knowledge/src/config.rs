//! Knowledge base configuration management.

use docqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Retrieval settings for a workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Target chunk length in characters
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,

    /// Hard cap on chunks per document
    pub max_chunks: usize,

    /// Embedding provider: "mock" or "ollama"
    pub embedding_provider: String,

    /// Embedding model identifier (provider-specific)
    pub embedding_model: String,

    /// Embedding vector dimensions, shared by the index
    pub embedding_dim: usize,

    /// Embedding endpoint override (Ollama)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_endpoint: Option<String>,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Chunks handed to the generator as context
    pub context_chunks: usize,

    /// Character budget of the extractive answer
    pub extractive_budget: usize,

    /// Minimum score a resolved chunk must reach to be returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_floor: Option<f32>,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_chunks: 1000,
            embedding_provider: "mock".to_string(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dim: 384,
            embedding_endpoint: None,
            temperature: 0.7,
            max_tokens: 1000,
            context_chunks: 5,
            extractive_budget: 500,
            relevance_floor: None,
        }
    }
}

impl KnowledgeBaseConfig {
    /// Load configuration for a workspace.
    ///
    /// Reads `.docqa/knowledge.yaml` if it exists, otherwise starts from
    /// defaults, then applies environment overrides and validates.
    pub fn load(workspace: &Path) -> AppResult<Self> {
        let config_path = get_config_path(workspace);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|e| {
                AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
            })?;

            let config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
                AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
            })?;

            tracing::debug!("Loaded knowledge config from {:?}", config_path);
            config
        } else {
            tracing::debug!("Using default knowledge config (no config file found)");
            Self::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `.docqa/knowledge.yaml`.
    pub fn save(&self, workspace: &Path) -> AppResult<()> {
        let config_path = get_config_path(workspace);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let yaml = serde_yaml::to_string(self)?;

        fs::write(&config_path, yaml).map_err(|e| {
            AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Saved knowledge config to {:?}", config_path);
        Ok(())
    }

    /// Apply `DOCQA_*` environment overrides.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Some(value) = env_usize("DOCQA_CHUNK_SIZE")? {
            self.chunk_size = value;
        }
        if let Some(value) = env_usize("DOCQA_CHUNK_OVERLAP")? {
            self.chunk_overlap = value;
        }
        if let Some(value) = env_usize("DOCQA_MAX_CHUNKS")? {
            self.max_chunks = value;
        }
        if let Some(value) = env_usize("DOCQA_VECTOR_DIMENSION")? {
            self.embedding_dim = value;
        }
        Ok(())
    }

    /// Reject settings the chunker or index cannot work with.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be greater than 0".to_string()));
        }
        if self.max_chunks == 0 {
            return Err(AppError::Config("max_chunks must be greater than 0".to_string()));
        }
        if self.embedding_dim == 0 {
            return Err(AppError::Config(
                "embedding_dim must be greater than 0".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            tracing::warn!(
                "chunk_overlap ({}) is not smaller than chunk_size ({}); chunks will not overlap",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> AppResult<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} must be a non-negative integer, got '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Get the `.docqa` data directory for a workspace.
pub fn get_data_dir(workspace: &Path) -> PathBuf {
    workspace.join(".docqa")
}

/// Get the path to the knowledge config file.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    get_data_dir(workspace).join("knowledge.yaml")
}

/// Get the index snapshot path.
pub fn get_index_path(workspace: &Path) -> PathBuf {
    get_data_dir(workspace).join("index.json")
}

/// Get the SQLite document store path.
pub fn get_store_path(workspace: &Path) -> PathBuf {
    get_data_dir(workspace).join("store.sqlite")
}
