//! Content source abstraction
//!
//! Ingestion reads content through the [`ContentSource`] trait: a lazy
//! stream of `(path, bytes)` entries. Sources are obtained from a
//! [`SourceDescriptor`] via a [`SourceResolver`], which may acquire a
//! temporary resource (a checked-out working copy, a crawl directory) that
//! is released when the returned [`SourceCheckout`] is dropped.
//!
//! Built in:
//! - [`FileSource`]: local directory trees
//! - [`MemorySource`]: pre-fetched content held in memory

use crate::error::Result;
use futures::stream::{self, BoxStream, StreamExt};

pub mod file;
pub mod resolver;

pub use file::{FileSource, FileSourceOptions};
pub use resolver::{
    LocalResolver, ResolverRegistry, SourceCheckout, SourceDescriptor, SourceKind, SourceResolver,
};

/// One document yielded by a content source
#[derive(Debug)]
pub struct SourceEntry {
    /// Source-relative path, `/`-separated
    pub path: String,
    /// Absolute path or URL
    pub locator: String,
    /// Content bytes, or the error that prevented reading this one entry
    pub bytes: Result<Vec<u8>>,
}

impl SourceEntry {
    pub fn new(path: impl Into<String>, locator: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            locator: locator.into(),
            bytes: Ok(bytes),
        }
    }
}

/// Anything that can enumerate documents for ingestion
pub trait ContentSource: Send + Sync {
    /// Source type identifier (e.g. "file", "memory")
    fn source_type(&self) -> &'static str;

    /// Lazily enumerate every document.
    ///
    /// An `Err` item means enumeration itself failed and the run must abort;
    /// a failure to read a single document is reported in
    /// [`SourceEntry::bytes`] instead.
    fn enumerate(&self) -> BoxStream<'_, Result<SourceEntry>>;
}

/// Content already held in memory, e.g. pages fetched by a crawler
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    root: String,
    entries: Vec<(String, Vec<u8>)>,
}

impl MemorySource {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    /// Add or replace the entry at `path`
    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let path = path.into();
        let bytes = bytes.into();
        match self.entries.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = bytes,
            None => self.entries.push((path, bytes)),
        }
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.retain(|(p, _)| p != path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContentSource for MemorySource {
    fn source_type(&self) -> &'static str {
        "memory"
    }

    fn enumerate(&self) -> BoxStream<'_, Result<SourceEntry>> {
        stream::iter(self.entries.iter().map(|(path, bytes)| {
            let locator = format!("{}/{}", self.root.trim_end_matches('/'), path);
            Ok(SourceEntry::new(path.clone(), locator, bytes.clone()))
        }))
        .boxed()
    }
}
