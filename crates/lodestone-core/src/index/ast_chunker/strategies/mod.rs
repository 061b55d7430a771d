//! Language-specific splitting strategies

mod go;
mod javascript;
mod python;
mod rust;

pub use go::GoStrategy;
pub use javascript::JavaScriptStrategy;
pub use python::PythonStrategy;
pub use rust::RustStrategy;

use super::language::Language;
use super::types::{ChunkType, SymbolSpan};
use tree_sitter::Node;

/// Trait for language-specific structural splitting
pub trait ChunkingStrategy: Send + Sync {
    /// Get the node types that represent semantic boundaries
    fn semantic_node_types(&self) -> &[&str];

    /// Determine chunk type from AST node
    fn chunk_type_for_node(&self, node: Node) -> ChunkType;

    /// Whether a top-level node starts its own unit
    fn is_semantic(&self, node: Node) -> bool {
        self.semantic_node_types().contains(&node.kind())
    }

    /// Symbol name for a unit node
    fn symbol_name(&self, source: &str, node: Node) -> Option<String> {
        extract_name_from_node(source, node)
    }

    /// Locate the top-level units of a parsed file, in document order.
    ///
    /// Spans never overlap; each one is widened backwards over the doc
    /// comments and attributes directly above it.
    fn extract_spans(&self, source: &str, root: Node) -> Vec<SymbolSpan> {
        let mut spans = Vec::new();
        let mut floor = 0;
        let mut cursor = root.walk();

        for node in root.children(&mut cursor) {
            if !self.is_semantic(node) {
                continue;
            }
            let start = leading_comment_start(source, node.start_byte()).max(floor);
            let end = node.end_byte();
            if end <= start {
                continue;
            }
            let (start_line, end_line) = line_numbers(source, start, end);
            spans.push(SymbolSpan {
                start,
                end,
                kind: self.chunk_type_for_node(node),
                name: self.symbol_name(source, node),
                start_line,
                end_line,
            });
            floor = end;
        }

        spans
    }
}

/// Enum-based strategy dispatch to avoid heap allocation
pub enum LanguageStrategy {
    Rust(RustStrategy),
    Python(PythonStrategy),
    JavaScript(JavaScriptStrategy),
    Go(GoStrategy),
}

impl LanguageStrategy {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Rust => Self::Rust(RustStrategy),
            Language::Python => Self::Python(PythonStrategy),
            Language::JavaScript => Self::JavaScript(JavaScriptStrategy::javascript()),
            Language::TypeScript | Language::TypeScriptTsx => {
                Self::JavaScript(JavaScriptStrategy::typescript())
            }
            Language::Go => Self::Go(GoStrategy),
        }
    }

    pub fn extract_spans(&self, source: &str, root: Node) -> Vec<SymbolSpan> {
        match self {
            Self::Rust(s) => s.extract_spans(source, root),
            Self::Python(s) => s.extract_spans(source, root),
            Self::JavaScript(s) => s.extract_spans(source, root),
            Self::Go(s) => s.extract_spans(source, root),
        }
    }
}

/// Byte offset where the comment/attribute block directly above `start` begins.
///
/// Returns `start` unchanged when the node does not begin its line.
pub fn leading_comment_start(source: &str, start: usize) -> usize {
    let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    if !source[line_start..start].trim().is_empty() {
        return start;
    }

    let mut block_start = line_start;
    while block_start > 0 {
        let prev_end = block_start - 1;
        let prev_start = source[..prev_end].rfind('\n').map(|i| i + 1).unwrap_or(0);
        if is_comment_line(source[prev_start..prev_end].trim()) {
            block_start = prev_start;
        } else {
            break;
        }
    }
    block_start
}

/// Check if a line is a comment or attribute
fn is_comment_line(line: &str) -> bool {
    line.starts_with("//")
        || line.starts_with('#')
        || line.starts_with("/*")
        || line.starts_with('*')
        || line.starts_with('@')
}

/// Compute 1-indexed line numbers for a byte range
pub fn line_numbers(source: &str, start_byte: usize, end_byte: usize) -> (usize, usize) {
    let start_line = source[..start_byte].matches('\n').count() + 1;
    let last = end_byte.saturating_sub(1).max(start_byte);
    let end_line = start_line + source[start_byte..last].matches('\n').count();
    (start_line, end_line)
}

/// Extract name identifier from a node
pub fn extract_name_from_node(source: &str, node: Node) -> Option<String> {
    let text = |n: Node| source[n.start_byte()..n.end_byte()].to_string();

    match node.kind() {
        "impl_item" => {
            let ty = node.child_by_field_name("type").map(text)?;
            match node.child_by_field_name("trait").map(text) {
                Some(tr) => Some(format!("{} for {}", tr, ty)),
                None => Some(ty),
            }
        }
        "decorated_definition" => node
            .child_by_field_name("definition")
            .and_then(|d| extract_name_from_node(source, d)),
        "export_statement" => node
            .child_by_field_name("declaration")
            .and_then(|d| extract_name_from_node(source, d)),
        "lexical_declaration" | "variable_declaration" | "type_declaration"
        | "const_declaration" | "var_declaration" => {
            let mut cursor = node.walk();
            let name = node
                .named_children(&mut cursor)
                .find_map(|child| child.child_by_field_name("name").map(text));
            name
        }
        _ => node.child_by_field_name("name").map(text),
    }
}
