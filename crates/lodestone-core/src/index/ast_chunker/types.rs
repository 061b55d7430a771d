//! Core types for structural splitting

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of syntactic unit a chunk was cut from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Trait,
    Interface,
    Impl,
    Module,
    Constant,
    Macro,
    Text,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Trait => "trait",
            Self::Interface => "interface",
            Self::Impl => "impl",
            Self::Module => "module",
            Self::Constant => "constant",
            Self::Macro => "macro",
            Self::Text => "text",
        }
    }
}

impl FromStr for ChunkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.to_lowercase().as_str() {
            "function" | "fn" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "struct" => Self::Struct,
            "enum" => Self::Enum,
            "trait" => Self::Trait,
            "interface" => Self::Interface,
            "impl" => Self::Impl,
            "module" | "mod" => Self::Module,
            "constant" | "const" => Self::Constant,
            "macro" => Self::Macro,
            "text" => Self::Text,
            other => {
                return Err(Error::InvalidInput(format!("Unknown symbol kind: {}", other)));
            }
        };
        Ok(kind)
    }
}

/// A top-level syntactic unit located in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSpan {
    /// Byte offset, leading doc comments included
    pub start: usize,
    /// Byte offset one past the node's last byte
    pub end: usize,
    pub kind: ChunkType,
    pub name: Option<String>,
    /// 1-indexed, inclusive
    pub start_line: usize,
    pub end_line: usize,
}
