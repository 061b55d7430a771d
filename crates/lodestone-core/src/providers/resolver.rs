//! Resolving source descriptors into content sources
//!
//! A resolver turns a [`SourceDescriptor`] into a [`SourceCheckout`]. Remote
//! kinds (git repositories, crawled sites) usually need a temporary working
//! copy; the checkout owns a cleanup action that runs exactly once when it
//! is dropped, whichever way the ingestion run ends.

use super::{ContentSource, FileSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Kind of content a descriptor points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LocalPath,
    GitRepository,
    WebCrawl,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalPath => "local_path",
            Self::GitRepository => "git_repository",
            Self::WebCrawl => "web_crawl",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to ingest: a source kind plus its resource identifier
/// (directory path, clone URL, seed URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub resource: String,
}

impl SourceDescriptor {
    pub fn new(kind: SourceKind, resource: impl Into<String>) -> Self {
        Self {
            kind,
            resource: resource.into(),
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self::new(SourceKind::LocalPath, path)
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;

/// A content source acquired for one run, plus whatever must be released
/// afterwards
pub struct SourceCheckout {
    source: Arc<dyn ContentSource>,
    cleanup: Option<Cleanup>,
}

impl SourceCheckout {
    /// Checkout with nothing to release
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            source,
            cleanup: None,
        }
    }

    /// Checkout that runs `cleanup` when dropped
    pub fn with_cleanup(source: Arc<dyn ContentSource>, cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            source,
            cleanup: Some(Box::new(cleanup)),
        }
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.source
    }
}

impl Drop for SourceCheckout {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            debug!(source = self.source.source_type(), "Releasing source checkout");
            cleanup();
        }
    }
}

impl fmt::Debug for SourceCheckout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCheckout")
            .field("source", &self.source.source_type())
            .field("has_cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Acquires content sources for one kind of descriptor
#[async_trait]
pub trait SourceResolver: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Acquire the source, checked out at `git_ref` when the kind supports refs
    async fn acquire(
        &self,
        descriptor: &SourceDescriptor,
        git_ref: Option<&str>,
    ) -> Result<SourceCheckout>;
}

/// Resolves local directories; refs are ignored
#[derive(Debug, Clone, Default)]
pub struct LocalResolver;

#[async_trait]
impl SourceResolver for LocalResolver {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalPath
    }

    async fn acquire(
        &self,
        descriptor: &SourceDescriptor,
        git_ref: Option<&str>,
    ) -> Result<SourceCheckout> {
        if git_ref.is_some() {
            debug!(resource = %descriptor.resource, "Ignoring ref for local source");
        }
        let source = FileSource::new(&descriptor.resource)?;
        Ok(SourceCheckout::new(Arc::new(source)))
    }
}

/// Registry of resolvers keyed by source kind
#[derive(Clone)]
pub struct ResolverRegistry {
    resolvers: HashMap<SourceKind, Arc<dyn SourceResolver>>,
}

impl ResolverRegistry {
    /// Create new empty registry
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// Registry with the local resolver
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalResolver));
        registry
    }

    pub fn register(&mut self, resolver: Arc<dyn SourceResolver>) {
        self.resolvers.insert(resolver.kind(), resolver);
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn SourceResolver>> {
        self.resolvers.get(&kind).cloned()
    }

    /// Acquire a source for `descriptor`; unknown kinds are `SourceUnavailable`
    pub async fn acquire(
        &self,
        descriptor: &SourceDescriptor,
        git_ref: Option<&str>,
    ) -> Result<SourceCheckout> {
        let resolver = self.get(descriptor.kind).ok_or_else(|| {
            Error::SourceUnavailable(format!("No resolver registered for {}", descriptor.kind))
        })?;
        resolver.acquire(descriptor, git_ref).await
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
