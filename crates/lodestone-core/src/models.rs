//! Shared data model: datasets, file records, chunks and vectors

use crate::error::{Error, Result};
use crate::index::ast_chunker::ChunkType;
use crate::jobs::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Visibility tier of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Project,
    Local,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Project => "project",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "project" => Ok(Self::Project),
            "local" => Ok(Self::Local),
            other => Err(Error::InvalidInput(format!("Unknown scope: {}", other))),
        }
    }
}

/// Namespace owning file records and chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub scope: Scope,
}

impl Dataset {
    pub fn new(id: impl Into<String>, name: impl Into<String>, scope: Scope) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scope,
        }
    }

    /// Dataset owned by one ingestion fingerprint; the id is a hash of the
    /// fingerprint key, so it is stable across runs and disjoint between
    /// fingerprints
    pub fn for_fingerprint(fingerprint: &Fingerprint) -> Self {
        let key = fingerprint.key();
        let hash = blake3::hash(key.as_bytes());
        Self {
            id: hash.to_hex()[..32].to_string(),
            name: key,
            scope: fingerprint.scope,
        }
    }
}

/// Stored metadata for one indexed path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub dataset_id: String,
    /// Dataset-relative path, `/`-separated
    pub path: String,
    /// Absolute path or URL of the source
    pub locator: String,
    /// Hex SHA-256 of the content bytes
    pub hash: String,
    pub size: u64,
    pub language: Option<String>,
    pub chunk_count: usize,
    /// False when some chunks failed to embed; such records are re-indexed on the next sync
    pub complete: bool,
    pub indexed_at: DateTime<Utc>,
}

/// Symbol metadata attached to a structurally split chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: Option<String>,
    pub kind: ChunkType,
    /// 1-indexed, inclusive
    pub start_line: usize,
    pub end_line: usize,
}

/// Which dense embedding space a vector lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenseKind {
    Text,
    Code,
}

impl DenseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
        }
    }
}

/// Sparse lexical vector as parallel index/weight arrays, sorted by index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Build from unsorted pairs; duplicate indices are summed
    pub fn from_pairs(mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_by_key(|(i, _)| *i);
        let mut indices: Vec<u32> = Vec::with_capacity(pairs.len());
        let mut values: Vec<f32> = Vec::with_capacity(pairs.len());
        for (i, v) in pairs {
            if indices.last() == Some(&i) {
                if let Some(last) = values.last_mut() {
                    *last += v;
                }
            } else {
                indices.push(i);
                values.push(v);
            }
        }
        Self { indices, values }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product via merge over the sorted indices
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut a, mut b) = (0, 0);
        let mut sum = 0.0;
        while a < self.indices.len() && b < other.indices.len() {
            match self.indices[a].cmp(&other.indices[b]) {
                std::cmp::Ordering::Less => a += 1,
                std::cmp::Ordering::Greater => b += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[a] * other.values[b];
                    a += 1;
                    b += 1;
                }
            }
        }
        sum
    }
}

/// A chunk together with its vectors, ready to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub file_id: String,
    pub dataset_id: String,
    pub path: String,
    /// Position within the parent file
    pub index: usize,
    pub text: String,
    /// Byte offset of `text` in the document, overlap prefix included
    pub start: usize,
    pub end: usize,
    /// Byte length of the overlap prefix shared with the previous chunk
    pub overlap: usize,
    pub language: Option<String>,
    pub symbol: Option<SymbolInfo>,
    pub summary: Option<String>,
    pub dense: Vec<f32>,
    pub code: Option<Vec<f32>>,
    pub sparse: Option<SparseVector>,
}

impl IndexedChunk {
    /// Human-readable pointer into the source, `path:start-end` when lines are known
    pub fn locator(&self) -> String {
        match &self.symbol {
            Some(sym) => format!("{}:{}-{}", self.path, sym.start_line, sym.end_line),
            None => format!("{}#{}", self.path, self.index),
        }
    }
}
