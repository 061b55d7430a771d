//! Python-specific splitting strategy

use super::ChunkingStrategy;
use crate::index::ast_chunker::types::ChunkType;
use tree_sitter::Node;

const PYTHON_SEMANTIC_NODES: &[&str] = &[
    "function_definition",
    "class_definition",
    "decorated_definition",
];

pub struct PythonStrategy;

impl ChunkingStrategy for PythonStrategy {
    fn semantic_node_types(&self) -> &[&str] {
        PYTHON_SEMANTIC_NODES
    }

    fn chunk_type_for_node(&self, node: Node) -> ChunkType {
        match node.kind() {
            "function_definition" => ChunkType::Function,
            "class_definition" => ChunkType::Class,
            "decorated_definition" => match get_decorated_inner(node) {
                Some(inner) => self.chunk_type_for_node(inner),
                None => ChunkType::Function,
            },
            _ => ChunkType::Text,
        }
    }
}

fn get_decorated_inner(node: Node) -> Option<Node> {
    node.child_by_field_name("definition")
}
