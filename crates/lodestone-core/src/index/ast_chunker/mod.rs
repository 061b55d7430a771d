//! AST-aware structural splitting
//!
//! Languages with a tree-sitter grammar get a [`StructuralSplitter`] that
//! locates top-level units (functions, classes, impls, ...) together with
//! their leading doc comments. The [`SplitterRegistry`] maps a language tag
//! to its splitter; languages without one fall back to fixed windows in the
//! chunker.

pub mod language;
pub mod parser;
pub mod strategies;
pub mod types;

pub use language::{is_code_language, language_tag, Language};
pub use strategies::{ChunkingStrategy, LanguageStrategy};
pub use types::{ChunkType, SymbolSpan};

use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Capability to split a document along syntactic unit boundaries
pub trait StructuralSplitter: Send + Sync {
    /// Language tag this splitter handles
    fn language(&self) -> &str;

    /// Top-level units in document order, non-overlapping
    fn split(&self, source: &str) -> Result<Vec<SymbolSpan>>;
}

/// Tree-sitter backed splitter for one grammar
pub struct TreeSitterSplitter {
    language: Language,
}

impl TreeSitterSplitter {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl StructuralSplitter for TreeSitterSplitter {
    fn language(&self) -> &str {
        self.language.as_str()
    }

    fn split(&self, source: &str) -> Result<Vec<SymbolSpan>> {
        let tree = parser::parse(source, self.language)?;
        let strategy = LanguageStrategy::for_language(self.language);
        Ok(strategy.extract_spans(source, tree.root_node()))
    }
}

/// Registry of structural splitters keyed by language tag
#[derive(Clone, Default)]
pub struct SplitterRegistry {
    splitters: HashMap<String, Arc<dyn StructuralSplitter>>,
}

impl SplitterRegistry {
    /// Empty registry; every language uses fixed windows
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a tree-sitter splitter for every bundled grammar
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for language in Language::ALL {
            registry.register(Arc::new(TreeSitterSplitter::new(language)));
        }
        registry
    }

    pub fn register(&mut self, splitter: Arc<dyn StructuralSplitter>) {
        self.splitters
            .insert(splitter.language().to_string(), splitter);
    }

    pub fn get(&self, language: &str) -> Option<Arc<dyn StructuralSplitter>> {
        self.splitters.get(language).cloned()
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.splitters.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }
}
