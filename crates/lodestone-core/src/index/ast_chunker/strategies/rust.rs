//! Rust-specific splitting strategy

use super::ChunkingStrategy;
use crate::index::ast_chunker::types::ChunkType;
use tree_sitter::Node;

const RUST_SEMANTIC_NODES: &[&str] = &[
    "function_item",
    "impl_item",
    "struct_item",
    "enum_item",
    "union_item",
    "trait_item",
    "mod_item",
    "type_item",
    "const_item",
    "static_item",
    "macro_definition",
];

pub struct RustStrategy;

impl ChunkingStrategy for RustStrategy {
    fn semantic_node_types(&self) -> &[&str] {
        RUST_SEMANTIC_NODES
    }

    fn chunk_type_for_node(&self, node: Node) -> ChunkType {
        match node.kind() {
            "function_item" => ChunkType::Function,
            "impl_item" => ChunkType::Impl,
            "struct_item" | "union_item" | "type_item" => ChunkType::Struct,
            "enum_item" => ChunkType::Enum,
            "trait_item" => ChunkType::Trait,
            "mod_item" => ChunkType::Module,
            "const_item" | "static_item" => ChunkType::Constant,
            "macro_definition" => ChunkType::Macro,
            _ => ChunkType::Text,
        }
    }
}
