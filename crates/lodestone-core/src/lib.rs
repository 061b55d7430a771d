//! Lodestone Core Library
//!
//! Incremental ingestion and hybrid retrieval for a code and documentation
//! assistant.
//!
//! # Features
//! - Content-addressed change detection (SHA-256 per file)
//! - Structure-aware chunking via tree-sitter with lossless overlap
//! - Bounded-concurrency dense, code and sparse embedding with per-batch retry
//! - Atomic per-file index replacement (SQLite or in-memory)
//! - Dense + sparse fusion, optional reranking, multi-variation queries
//! - Fingerprint-keyed jobs with progress reporting and cancellation

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod index;
pub mod jobs;
pub mod llm;
pub mod models;
pub mod providers;
pub mod search;

pub use config::{Config, LLMServiceConfig};
pub use context::IndexContext;
pub use db::{Database, IndexStore, MemoryStore, SearchFilter};
pub use error::{Error, LodestoneError, Result};
pub use index::{
    run_sync, ChangeDetector, ChangeKind, ChangeSet, ChunkDescriptor, Chunker,
    EmbeddingOrchestrator, IndexWriter, SyncFailure,
};
pub use jobs::{
    BroadcastSink, CancellationToken, Fingerprint, JobCoordinator, JobError, JobHandle, JobResult,
    JobStats, JobStatus, NullSink, Phase, ProgressEvent, ProgressReporter, ProgressSink,
    SubmitOutcome, SyncOptions, TracingSink,
};
pub use llm::{
    AnswerSynthesizer, Embedder, ExpandedQuery, HttpAnswerSynthesizer, HttpEmbedder,
    HttpLLMClient, HttpQueryExpander, HttpReranker, LLMClient, LexicalEncoder, ProviderSet,
    QueryExpander, Reranker,
};
pub use models::{Dataset, DenseKind, FileRecord, IndexedChunk, Scope, SparseVector, SymbolInfo};
pub use providers::{
    ContentSource, FileSource, MemorySource, ResolverRegistry, SourceCheckout, SourceDescriptor,
    SourceEntry, SourceKind, SourceResolver,
};
pub use search::{QueryFilters, QueryRequest, QueryResult, RetrievalEngine, SmartQueryResult};

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "lodestone";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "lodestone";
