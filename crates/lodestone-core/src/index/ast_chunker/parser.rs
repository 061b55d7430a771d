//! Tree-sitter parser wrapper

use super::language::Language;
use crate::error::{Error, Result};
use tree_sitter::{Parser, Tree};

/// Parse source code into a tree-sitter AST
pub fn parse(source: &str, language: Language) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&language.grammar())
        .map_err(|e| Error::Parse(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| Error::Parse(format!("{} parser returned no tree", language.as_str())))
}
