//! JavaScript/TypeScript-specific splitting strategy

use super::{extract_name_from_node, ChunkingStrategy};
use crate::index::ast_chunker::types::ChunkType;
use tree_sitter::Node;

const JS_SEMANTIC_NODES: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "class_declaration",
    "abstract_class_declaration",
    "export_statement",
    "interface_declaration",
    "type_alias_declaration",
    "enum_declaration",
    "module",
];

pub struct JavaScriptStrategy {
    pub is_typescript: bool,
}

impl JavaScriptStrategy {
    pub fn javascript() -> Self {
        Self {
            is_typescript: false,
        }
    }

    pub fn typescript() -> Self {
        Self {
            is_typescript: true,
        }
    }
}

impl ChunkingStrategy for JavaScriptStrategy {
    fn semantic_node_types(&self) -> &[&str] {
        JS_SEMANTIC_NODES
    }

    fn is_semantic(&self, node: Node) -> bool {
        JS_SEMANTIC_NODES.contains(&node.kind()) || is_variable_with_function(node)
    }

    fn chunk_type_for_node(&self, node: Node) -> ChunkType {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => ChunkType::Function,
            "lexical_declaration" | "variable_declaration" => ChunkType::Function,
            "class_declaration" | "abstract_class_declaration" => ChunkType::Class,
            "interface_declaration" => ChunkType::Interface,
            "type_alias_declaration" => ChunkType::Struct,
            "enum_declaration" => ChunkType::Enum,
            "module" => ChunkType::Module,
            "export_statement" => match get_exported_declaration(node) {
                Some(decl) if is_variable_with_function(decl) => ChunkType::Function,
                Some(decl) if decl.kind() == "lexical_declaration" => ChunkType::Constant,
                Some(decl) => self.chunk_type_for_node(decl),
                None => ChunkType::Module,
            },
            _ => ChunkType::Text,
        }
    }

    fn symbol_name(&self, source: &str, node: Node) -> Option<String> {
        if node.kind() == "export_statement" {
            return get_exported_declaration(node).and_then(|d| extract_name_from_node(source, d));
        }
        extract_name_from_node(source, node)
    }
}

fn get_exported_declaration(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let decl = node.children(&mut cursor).find(|child| {
        let k = child.kind();
        child.is_named() && k != "export" && k != "default" && !k.contains("comment")
    });
    decl
}

fn is_variable_with_function(node: Node) -> bool {
    let kind = node.kind();
    if kind != "lexical_declaration" && kind != "variable_declaration" {
        return false;
    }

    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).any(|child| {
        child.kind() == "variable_declarator"
            && child
                .child_by_field_name("value")
                .map(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"))
                .unwrap_or(false)
    });
    found
}
