//! Error types for lodestone

use thiserror::Error;

/// Result type alias using LodestoneError
pub type Result<T> = std::result::Result<T, LodestoneError>;

/// Error type alias for convenience
pub type Error = LodestoneError;

/// Exit codes for hosts embedding the library in a binary
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for lodestone
#[derive(Debug, Error)]
pub enum LodestoneError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Enumerating the content source failed; fatal for the job
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// An embedding provider call failed (after retries when surfaced from the orchestrator)
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// The atomic replace of a single file failed; the job continues
    #[error("Storage write error for {path}: {message}")]
    StorageWrite { path: String, message: String },

    #[error("Rerank unavailable: {0}")]
    RerankUnavailable(String),

    #[error("Sparse search unavailable: {0}")]
    SparseUnavailable(String),

    /// Both dense and sparse candidate generation failed
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LodestoneError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DatasetNotFound(_) => exit_codes::NOT_FOUND,
            Self::InvalidInput(_) | Self::Config(_) => exit_codes::INVALID_INPUT,
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// Whether a provider call failing with this error is worth retrying.
    ///
    /// Transport failures, provider-side errors and resource exhaustion
    /// (HTTP 429 / 5xx surfaced as `ExternalError`) are retryable;
    /// malformed requests and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_)
            | Self::EmbeddingProvider(_)
            | Self::ExternalError(_)
            | Self::Llm(_)
            | Self::Io(_) => true,
            Self::Config(_) | Self::InvalidInput(_) | Self::Cancelled(_) => false,
            _ => false,
        }
    }

    /// Short machine-readable category, used in job error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::EmbeddingProvider(_) => "embedding_provider",
            Self::StorageWrite { .. } | Self::Database(_) => "storage_write",
            Self::RerankUnavailable(_) => "rerank_unavailable",
            Self::SparseUnavailable(_) => "sparse_unavailable",
            Self::RetrievalUnavailable(_) => "retrieval_unavailable",
            Self::Cancelled(_) => "cancelled",
            Self::Io(_) | Self::WalkDir(_) => "io",
            Self::Parse(_) => "parse",
            _ => "internal",
        }
    }
}
