//! Go-specific splitting strategy

use super::ChunkingStrategy;
use crate::index::ast_chunker::types::ChunkType;
use tree_sitter::Node;

const GO_SEMANTIC_NODES: &[&str] = &[
    "function_declaration",
    "method_declaration",
    "type_declaration",
    "const_declaration",
    "var_declaration",
];

pub struct GoStrategy;

impl ChunkingStrategy for GoStrategy {
    fn semantic_node_types(&self) -> &[&str] {
        GO_SEMANTIC_NODES
    }

    fn chunk_type_for_node(&self, node: Node) -> ChunkType {
        match node.kind() {
            "function_declaration" => ChunkType::Function,
            "method_declaration" => ChunkType::Method,
            "type_declaration" => {
                if contains_node_kind(node, "interface_type") {
                    ChunkType::Interface
                } else {
                    ChunkType::Struct
                }
            }
            "const_declaration" | "var_declaration" => ChunkType::Constant,
            _ => ChunkType::Text,
        }
    }
}

fn contains_node_kind(node: Node, target_kind: &str) -> bool {
    if node.kind() == target_kind {
        return true;
    }
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| contains_node_kind(child, target_kind));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ast_chunker::language::Language;
    use crate::index::ast_chunker::parser::parse;

    #[test]
    fn test_extract_go_units() {
        let source = r#"package main

import "fmt"

// Shape has an area.
type Shape interface {
	Area() float64
}

type Square struct {
	side float64
}

func (s Square) Area() float64 {
	return s.side * s.side
}

func main() {
	fmt.Println(Square{2}.Area())
}
"#;
        let tree = parse(source, Language::Go).unwrap();
        let spans = GoStrategy.extract_spans(source, tree.root_node());

        let kinds: Vec<_> = spans.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChunkType::Interface,
                ChunkType::Struct,
                ChunkType::Method,
                ChunkType::Function
            ]
        );
        assert_eq!(spans[0].name.as_deref(), Some("Shape"));
        assert!(source[spans[0].start..].starts_with("// Shape has an area."));
        assert_eq!(spans[2].name.as_deref(), Some("Area"));
        assert_eq!(spans[3].name.as_deref(), Some("main"));
    }
}
