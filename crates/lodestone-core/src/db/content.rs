//! Content hashing and stable identifiers

use sha2::{Digest, Sha256};

/// Hash content bytes using SHA-256, lowercase hex
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Stable file id for a dataset-relative path
pub fn file_id(dataset_id: &str, path: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(dataset_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(path.as_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}

/// Chunk id, unique per file version: identical content at the same index
/// yields the same id, any change yields a new one
pub fn chunk_id(file_id: &str, index: usize, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_id.as_bytes());
    hasher.update(&(index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}
