//! Indexing pipeline
//!
//! Change detection, chunking, embedding and index writes for incremental
//! ingestion.

pub mod ast_chunker;
mod chunker;
mod embedder;
mod pipeline;
mod scanner;
mod writer;

pub use ast_chunker::{ChunkType, SplitterRegistry, StructuralSplitter};
pub use chunker::{reconstruct, ChunkDescriptor, Chunker, CHUNK_OVERLAP_CHARS, CHUNK_SIZE_CHARS};
pub use embedder::{BatchFailure, ChunkVectors, EmbeddingOrchestrator, EmbeddingOutput, RetryPolicy};
pub use pipeline::{run_sync, SyncFailure};
pub use scanner::{ChangeDetector, ChangeKind, ChangeSet, PendingFile, ScanError};
pub use writer::IndexWriter;
