//! Local sparse lexical encoder
//!
//! Produces term-weight vectors without a remote model: text is lowercased
//! and split into alphanumeric terms (identifiers keep `_`), each term is
//! hashed to a `u32` id with blake3, weighted `1 + ln(tf)`, and the vector
//! is L2-normalised so the dot product of two vectors is a cosine.

use crate::models::SparseVector;
use std::collections::HashMap;

/// Terms shorter than this are dropped
const MIN_TERM_LEN: usize = 2;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "was", "with",
];

/// Hashing sparse encoder; stateless and cheap to clone
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalEncoder;

impl LexicalEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Split into lowercase terms. `snake_case` identifiers are kept whole
    /// and also contribute their parts.
    pub fn tokenize(text: &str) -> Vec<String> {
        let mut terms = Vec::new();
        for word in text
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
        {
            let lower = word.to_lowercase();
            if lower.contains('_') {
                terms.extend(
                    lower
                        .split('_')
                        .filter(|p| p.len() >= MIN_TERM_LEN)
                        .map(str::to_string),
                );
            }
            let trimmed = lower.trim_matches('_');
            if trimmed.len() >= MIN_TERM_LEN && !STOPWORDS.contains(&trimmed) {
                terms.push(trimmed.to_string());
            }
        }
        terms
    }

    /// Stable 32-bit id for a term
    pub fn term_id(term: &str) -> u32 {
        let hash = blake3::hash(term.as_bytes());
        let bytes = hash.as_bytes();
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn encode(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for term in Self::tokenize(text) {
            *counts.entry(term).or_insert(0) += 1;
        }

        let pairs: Vec<(u32, f32)> = counts
            .into_iter()
            .map(|(term, tf)| (Self::term_id(&term), 1.0 + (tf as f32).ln()))
            .collect();
        let mut vector = SparseVector::from_pairs(pairs);

        let norm = vector.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector.values {
                *v /= norm;
            }
        }
        vector
    }

    pub fn encode_batch(&self, texts: &[String]) -> Vec<SparseVector> {
        texts.iter().map(|t| self.encode(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let terms = LexicalEncoder::tokenize("The parse_config() function, in Rust!");
        assert_eq!(terms, vec!["parse", "config", "parse_config", "function", "rust"]);
    }

    #[test]
    fn test_encode_is_normalised() {
        let v = LexicalEncoder.encode("retry backoff retry jitter");
        assert_eq!(v.indices.len(), 3);
        let norm: f32 = v.values.iter().map(|x| x * x).sum();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!((v.dot(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_terms_score_higher() {
        let enc = LexicalEncoder::new();
        let query = enc.encode("exponential backoff");
        let relevant = enc.encode("retry with exponential backoff and a cap");
        let unrelated = enc.encode("tree-sitter grammar for go");
        assert!(query.dot(&relevant) > query.dot(&unrelated));
        assert_eq!(query.dot(&unrelated), 0.0);
    }

    #[test]
    fn test_empty_text() {
        assert!(LexicalEncoder.encode("").is_empty());
        assert!(LexicalEncoder.encode("a the of").is_empty());
    }
}
