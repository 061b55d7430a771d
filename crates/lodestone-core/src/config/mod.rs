//! Configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chunk window sizes
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding orchestration (batching, concurrency, retry)
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Hybrid retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Job execution limits
    #[serde(default)]
    pub jobs: JobConfig,

    /// LLM service configuration
    #[serde(default)]
    pub llm_service: LLMServiceConfig,

    /// SQLite database path; in-memory store when absent
    #[serde(default)]
    pub database: Option<PathBuf>,
}

/// Chunker window configuration, measured in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,

    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: default_target_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_target_chars() -> usize {
    1000
}

fn default_overlap_chars() -> usize {
    100
}

/// Embedding orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Texts per provider call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// In-flight calls per provider
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts per sub-batch, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Compute sparse lexical vectors during ingestion
    #[serde(default = "default_true")]
    pub sparse: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            sparse: true,
        }
    }
}

fn default_batch_size() -> usize {
    32
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

/// Hybrid retrieval configuration.
///
/// Each search stage fetches `top_k * candidate_multiplier` candidates.
/// The fused score is `dense_weight * dense + sparse_weight * sparse` over
/// min-max normalized scores; equal weighting by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidate headroom per stage (default 4)
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Weight of the normalized dense score (default 0.5)
    #[serde(default = "default_weight")]
    pub dense_weight: f64,

    /// Weight of the normalized sparse score (default 0.5)
    #[serde(default = "default_weight")]
    pub sparse_weight: f64,

    /// Fused candidates handed to the reranker (default 40)
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    #[serde(default = "default_true")]
    pub rerank: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_multiplier: default_candidate_multiplier(),
            dense_weight: default_weight(),
            sparse_weight: default_weight(),
            rerank_top_n: default_rerank_top_n(),
            rerank: true,
        }
    }
}

fn default_candidate_multiplier() -> usize {
    4
}

fn default_weight() -> f64 {
    0.5
}

fn default_rerank_top_n() -> usize {
    40
}

/// Job execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Jobs running at the same time
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Files chunked and embedded in parallel within one job
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Minimum spacing between progress events of one job
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_concurrent_files: default_max_concurrent_files(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_max_concurrent_files() -> usize {
    8
}

fn default_progress_interval_ms() -> u64 {
    250
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the LLM service for chat/completions
    pub url: String,

    /// Model name for chat completions (query expansion, answer synthesis)
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for text embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Model name for code embeddings; code chunks get no code vector when unset
    #[serde(default)]
    pub code_embedding_model: Option<String>,

    /// Base URL for the rerank endpoint (falls back to main URL)
    #[serde(default)]
    pub rerank_url: Option<String>,

    /// Model name for reranking; reranking is disabled when unset
    #[serde(default)]
    pub rerank_model: Option<String>,

    /// Enable LLM query expansion for smart queries
    #[serde(default)]
    pub query_expansion: bool,

    /// Enable LLM answer synthesis for smart queries
    #[serde(default)]
    pub synthesis: bool,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl LLMServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }

    /// Get the rerank URL (falls back to main URL if not specified)
    pub fn reranker_url(&self) -> &str {
        self.rerank_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("LODESTONE_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            model: default_chat_model(),
            embedding_url: std::env::var("LODESTONE_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            code_embedding_model: std::env::var("LODESTONE_CODE_EMBEDDING_MODEL").ok(),
            rerank_url: std::env::var("LODESTONE_RERANK_URL").ok(),
            rerank_model: std::env::var("LODESTONE_RERANK_MODEL").ok(),
            query_expansion: false,
            synthesis: false,
            api_key: std::env::var("LODESTONE_LLM_API_KEY").ok(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("LODESTONE_LLM_MODEL")
        .unwrap_or_else(|_| "meta-llama/Llama-3.1-8B-Instruct".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("LODESTONE_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string())
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load config from `LODESTONE_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var("LODESTONE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load and validate config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.target_chars == 0 {
            return Err(Error::Config("chunking.target_chars must be > 0".into()));
        }
        if c.overlap_chars >= c.target_chars {
            return Err(Error::Config(format!(
                "chunking.overlap_chars ({}) must be smaller than target_chars ({})",
                c.overlap_chars, c.target_chars
            )));
        }

        let e = &self.embedding;
        if e.batch_size == 0 || e.max_concurrent == 0 || e.max_attempts == 0 {
            return Err(Error::Config(
                "embedding.batch_size, max_concurrent and max_attempts must be > 0".into(),
            ));
        }

        let r = &self.retrieval;
        if r.candidate_multiplier == 0 {
            return Err(Error::Config(
                "retrieval.candidate_multiplier must be > 0".into(),
            ));
        }
        if r.dense_weight < 0.0 || r.sparse_weight < 0.0 {
            return Err(Error::Config("retrieval weights must be >= 0".into()));
        }
        if r.dense_weight + r.sparse_weight <= 0.0 {
            return Err(Error::Config(
                "at least one retrieval weight must be positive".into(),
            ));
        }

        if self.jobs.workers == 0 || self.jobs.max_concurrent_files == 0 {
            return Err(Error::Config(
                "jobs.workers and jobs.max_concurrent_files must be > 0".into(),
            ));
        }
        Ok(())
    }
}
