//! Index context
//!
//! Everything an ingestion run or a query needs, constructed once and
//! shared behind an `Arc`. There is no process-wide instance; hosts build
//! one with [`IndexContext::from_config`] or assemble it by hand in tests.

use crate::config::Config;
use crate::db::{Database, IndexStore};
use crate::error::Result;
use crate::index::ast_chunker::SplitterRegistry;
use crate::index::{Chunker, EmbeddingOrchestrator, IndexWriter};
use crate::llm::ProviderSet;
use crate::providers::ResolverRegistry;
use crate::search::RetrievalEngine;
use std::sync::Arc;
use tracing::info;

pub struct IndexContext {
    config: Config,
    store: Arc<dyn IndexStore>,
    providers: ProviderSet,
    resolvers: ResolverRegistry,
    chunker: Chunker,
    orchestrator: EmbeddingOrchestrator,
    writer: IndexWriter,
}

impl IndexContext {
    /// Context over an existing store and provider set, with the default
    /// structural splitters and source resolvers
    pub fn new(config: Config, store: Arc<dyn IndexStore>, providers: ProviderSet) -> Self {
        let chunker = Chunker::new(&config.chunking, SplitterRegistry::with_defaults());
        let orchestrator = EmbeddingOrchestrator::new(providers.embedder.clone(), &config.embedding);
        let writer = IndexWriter::new(store.clone());
        Self {
            config,
            store,
            providers,
            resolvers: ResolverRegistry::with_defaults(),
            chunker,
            orchestrator,
            writer,
        }
    }

    /// Open the configured SQLite database and HTTP providers
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let path = config.database.clone().unwrap_or_else(Database::default_path);
        let db = Database::open(&path)?;
        db.initialize()?;
        let providers = ProviderSet::from_config(&config)?;

        info!(database = %path.display(), "Index context ready");
        Ok(Self::new(config, Arc::new(db), providers))
    }

    /// Replace the structural splitters used for chunking
    pub fn with_splitters(mut self, splitters: SplitterRegistry) -> Self {
        self.chunker = Chunker::new(&self.config.chunking, splitters);
        self
    }

    /// Replace the source resolvers, e.g. to add git or web checkouts
    pub fn with_resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn orchestrator(&self) -> &EmbeddingOrchestrator {
        &self.orchestrator
    }

    pub fn writer(&self) -> &IndexWriter {
        &self.writer
    }

    /// Retrieval engine over this context's store and providers
    pub fn retrieval(&self) -> RetrievalEngine {
        RetrievalEngine::new(
            self.store.clone(),
            self.providers.clone(),
            self.config.retrieval.clone(),
        )
    }
}
