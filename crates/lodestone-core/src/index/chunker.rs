//! Document chunking for embedding
//!
//! A document is first partitioned into segments: one per top-level
//! syntactic unit when a structural splitter exists for the language, or a
//! single segment otherwise. Segments longer than the target window are cut
//! into fixed windows, preferring paragraph/sentence/line/word breaks.
//!
//! Consecutive windows of one segment overlap: each window after the first
//! is prefixed with up to `overlap_chars` bytes copied from the end of the
//! previous window. Dropping every chunk's `overlap` prefix and
//! concatenating the rest yields the original text byte for byte.

use super::ast_chunker::strategies::line_numbers;
use super::ast_chunker::{SplitterRegistry, SymbolSpan};
use crate::config::ChunkingConfig;
use crate::models::SymbolInfo;
use tracing::debug;

/// Default target window in bytes (~characters for ASCII text)
pub const CHUNK_SIZE_CHARS: usize = 1000;
/// Default overlap in bytes
pub const CHUNK_OVERLAP_CHARS: usize = 100;

const BREAK_SEARCH_PERCENT: usize = 30;

/// One chunk of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Position within the document
    pub index: usize,
    /// Chunk text, overlap prefix included
    pub text: String,
    /// Byte offset of `text` in the document
    pub start: usize,
    /// Byte offset one past the end of `text`
    pub end: usize,
    /// Byte length of the prefix shared with the previous chunk
    pub overlap: usize,
    pub symbol: Option<SymbolInfo>,
}

impl ChunkDescriptor {
    /// The part of the chunk not shared with its predecessor
    pub fn content(&self) -> &str {
        &self.text[self.overlap..]
    }
}

/// Rebuild a document from its chunks by dropping each overlap prefix
pub fn reconstruct(chunks: &[ChunkDescriptor]) -> String {
    chunks.iter().map(ChunkDescriptor::content).collect()
}

#[derive(Debug)]
struct Segment {
    start: usize,
    end: usize,
    symbol: Option<SymbolSpan>,
}

/// Splits documents into overlapping, structure-aware chunks
#[derive(Clone)]
pub struct Chunker {
    target_chars: usize,
    overlap_chars: usize,
    splitters: SplitterRegistry,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(&ChunkingConfig::default(), SplitterRegistry::with_defaults())
    }
}

impl Chunker {
    pub fn new(config: &ChunkingConfig, splitters: SplitterRegistry) -> Self {
        Self {
            target_chars: config.target_chars.max(1),
            overlap_chars: config.overlap_chars,
            splitters,
        }
    }

    /// Fixed windows only, no structural splitting
    pub fn fixed(target_chars: usize, overlap_chars: usize) -> Self {
        Self {
            target_chars: target_chars.max(1),
            overlap_chars,
            splitters: SplitterRegistry::new(),
        }
    }

    /// Split `text` into ordered chunks. `language` selects a structural
    /// splitter when one is registered for it.
    pub fn chunk(&self, text: &str, language: Option<&str>) -> Vec<ChunkDescriptor> {
        if text.is_empty() {
            return vec![ChunkDescriptor {
                index: 0,
                text: String::new(),
                start: 0,
                end: 0,
                overlap: 0,
                symbol: None,
            }];
        }

        let segments = self.segments(text, language);
        let mut chunks = Vec::new();

        for segment in segments {
            let windows = split_windows(text, segment.start, segment.end, self.target_chars);
            for (i, &(start, end)) in windows.iter().enumerate() {
                let text_start = if i == 0 {
                    start
                } else {
                    let floor = start.saturating_sub(self.overlap_chars).max(windows[i - 1].0);
                    ceil_char_boundary(text, floor)
                };
                let symbol = segment
                    .symbol
                    .as_ref()
                    .map(|span| symbol_for_window(text, span, start, end));

                chunks.push(ChunkDescriptor {
                    index: chunks.len(),
                    text: text[text_start..end].to_string(),
                    start: text_start,
                    end,
                    overlap: start - text_start,
                    symbol,
                });
            }
        }

        chunks
    }

    fn segments(&self, text: &str, language: Option<&str>) -> Vec<Segment> {
        let whole = || {
            vec![Segment {
                start: 0,
                end: text.len(),
                symbol: None,
            }]
        };

        let Some(splitter) = language.and_then(|lang| self.splitters.get(lang)) else {
            return whole();
        };

        match splitter.split(text) {
            Ok(spans) if !spans.is_empty() => structural_segments(text, spans),
            Ok(_) => whole(),
            Err(e) => {
                debug!(
                    error = %e,
                    language = splitter.language(),
                    "Structural split failed, falling back to fixed windows"
                );
                whole()
            }
        }
    }
}

/// Partition the whole text into symbol segments and the gaps between them.
/// Whitespace-only gaps are folded into a neighbouring segment.
fn structural_segments(text: &str, spans: Vec<SymbolSpan>) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut cursor = 0;

    for span in spans {
        let start = span.start.max(cursor);
        let end = span.end.min(text.len());
        if end <= start || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            continue;
        }
        if start > cursor {
            push_gap(text, &mut segments, cursor, start);
        }
        segments.push(Segment {
            start,
            end,
            symbol: Some(span),
        });
        cursor = end;
    }
    if cursor < text.len() {
        push_gap(text, &mut segments, cursor, text.len());
    }

    // A whitespace-only prefix becomes part of the first real segment
    if segments.len() > 1 && text[segments[0].start..segments[0].end].trim().is_empty() {
        let head = segments.remove(0);
        segments[0].start = head.start;
    }

    segments
}

fn push_gap(text: &str, segments: &mut Vec<Segment>, start: usize, end: usize) {
    let blank = text[start..end].trim().is_empty();
    match segments.last_mut() {
        Some(last) if blank || last.symbol.is_none() => last.end = end,
        _ => segments.push(Segment {
            start,
            end,
            symbol: None,
        }),
    }
}

/// Cut `[start, end)` into windows of at most `target` bytes (one char
/// minimum), ending on a natural break in the last 30% when there is one.
fn split_windows(text: &str, start: usize, end: usize, target: usize) -> Vec<(usize, usize)> {
    let mut windows = Vec::new();
    let mut s = start;

    while end - s > target {
        let raw_end = floor_char_boundary(text, s + target);
        let mut cut = raw_end;

        let search_start = ceil_char_boundary(text, s + target * (100 - BREAK_SEARCH_PERCENT) / 100);
        if search_start < raw_end {
            let region = &text[search_start..raw_end];
            if let Some(pos) = region.rfind("\n\n") {
                cut = search_start + pos + 2;
            } else if let Some(pos) = region.rfind(". ") {
                cut = search_start + pos + 2;
            } else if let Some(pos) = region.rfind('\n') {
                cut = search_start + pos + 1;
            } else if let Some(pos) = region.rfind(' ') {
                cut = search_start + pos + 1;
            }
        }

        // Guard: always make progress, even when one char exceeds the target
        if cut <= s {
            cut = ceil_char_boundary(text, s + 1);
        }

        windows.push((s, cut));
        s = cut;
    }

    windows.push((s, end));
    windows
}

fn symbol_for_window(text: &str, span: &SymbolSpan, start: usize, end: usize) -> SymbolInfo {
    let window = &text[start..end];
    let lead = window.len() - window.trim_start().len();
    let trail = window.len() - window.trim_end().len();
    let (content_start, content_end) = if lead + trail >= window.len() {
        (start, end)
    } else {
        (start + lead, end - trail)
    };
    let (start_line, end_line) = line_numbers(text, content_start, content_end);

    SymbolInfo {
        name: span.name.clone(),
        kind: span.kind,
        start_line,
        end_line,
    }
}

/// Find a valid char boundary at or before the given byte index
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find a valid char boundary at or after the given byte index
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ast_chunker::ChunkType;
    use proptest::prelude::*;

    fn assert_invariants(text: &str, chunks: &[ChunkDescriptor]) {
        assert!(!chunks.is_empty());
        assert_eq!(reconstruct(chunks), text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
            if i == 0 {
                assert_eq!(chunk.overlap, 0);
            } else {
                let prev = &chunks[i - 1];
                assert!(prev.text.ends_with(&chunk.text[..chunk.overlap]));
                assert_eq!(chunk.start + chunk.overlap, prev.end);
            }
        }
    }

    #[test]
    fn test_empty_document() {
        let chunks = Chunker::default().chunk("", Some("rust"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
        assert_eq!(chunks[0].overlap, 0);
        assert!(chunks[0].symbol.is_none());
    }

    #[test]
    fn test_single_character() {
        let chunks = Chunker::fixed(10, 3).chunk("x", None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "x");
        assert_invariants("x", &chunks);
    }

    #[test]
    fn test_small_content_is_one_chunk() {
        let content = "Small content.";
        let chunks = Chunker::fixed(100, 20).chunk(content, None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);
    }

    #[test]
    fn test_windows_overlap_and_reconstruct() {
        let content = "First paragraph here.\n\nSecond paragraph follows. It is longer than the first.\n\nThird.";
        let chunks = Chunker::fixed(30, 8).chunk(content, None);
        assert!(chunks.len() >= 3);
        assert!(chunks[1..].iter().all(|c| c.overlap > 0));
        assert_invariants(content, &chunks);
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let content = "aaaaaaaaaaaaaaaaaaaaaaa\n\nbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
        let chunks = Chunker::fixed(30, 0).chunk(content, None);
        assert_eq!(chunks[0].text, "aaaaaaaaaaaaaaaaaaaaaaa\n\n");
    }

    #[test]
    fn test_handles_unicode() {
        let content = "Hello 世界! This is a test with emoji 🎉 and special chars ─ here.";
        let chunks = Chunker::fixed(7, 3).chunk(content, None);
        assert!(chunks.len() > 1);
        assert_invariants(content, &chunks);
    }

    #[test]
    fn test_structural_rust_chunks() {
        let content = r#"use std::io;

/// Says hi
fn hello() {
    println!("hi");
}

struct Point {
    x: i32,
}
"#;
        let chunks = Chunker::default().chunk(content, Some("rust"));
        assert_invariants(content, &chunks);

        let symbols: Vec<_> = chunks.iter().filter_map(|c| c.symbol.as_ref()).collect();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].kind, ChunkType::Function);
        assert_eq!(symbols[0].name.as_deref(), Some("hello"));
        assert_eq!((symbols[0].start_line, symbols[0].end_line), (3, 6));
        assert_eq!(symbols[1].kind, ChunkType::Struct);
        assert_eq!(symbols[1].start_line, 8);

        // Structural units do not overlap each other
        assert!(chunks.iter().all(|c| c.overlap == 0));
        assert!(chunks.iter().any(|c| c.text.starts_with("/// Says hi")));
    }

    #[test]
    fn test_oversized_unit_is_windowed() {
        let body: String = (0..60).map(|i| format!("    let v{} = {};\n", i, i)).collect();
        let content = format!("fn big() {{\n{}}}\n", body);
        let chunks = Chunker::fixed(200, 40).chunk(&content, None);
        assert!(chunks.len() > 1);

        let mut structural = Chunker::fixed(200, 40);
        structural.splitters = SplitterRegistry::with_defaults();
        let chunks = structural.chunk(&content, Some("rust"));
        assert!(chunks.len() > 1);
        assert!(chunks
            .iter()
            .all(|c| c.symbol.as_ref().and_then(|s| s.name.as_deref()) == Some("big")));
        assert!(chunks[1].overlap > 0);
        assert_invariants(&content, &chunks);
    }

    #[test]
    fn test_unparseable_language_falls_back() {
        let content = "# Title\n\nSome markdown.";
        let chunks = Chunker::default().chunk(content, Some("markdown"));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].symbol.is_none());
    }

    #[test]
    fn test_floor_char_boundary() {
        let s = "Hello 世界";
        assert_eq!(floor_char_boundary(s, 6), 6);
        assert_eq!(floor_char_boundary(s, 7), 6);
        assert_eq!(floor_char_boundary(s, 8), 6);
        assert_eq!(floor_char_boundary(s, 9), 9);
    }

    proptest! {
        #[test]
        fn prop_fixed_windows_reconstruct(
            text in "\\PC{0,400}",
            target in 1usize..64,
            overlap in 0usize..64,
        ) {
            let chunks = Chunker::fixed(target, overlap).chunk(&text, None);
            prop_assert_eq!(reconstruct(&chunks), text.clone());
            for pair in chunks.windows(2) {
                let shared = &pair[1].text[..pair[1].overlap];
                prop_assert!(pair[0].text.ends_with(shared));
            }
        }

        #[test]
        fn prop_structural_reconstruct(
            names in proptest::collection::vec("[a-z]{1,8}", 0..6),
            filler in "[ \\n]{0,3}",
            target in 8usize..120,
        ) {
            let text: String = names
                .iter()
                .map(|n| format!("{}/// doc\nfn {}() {{ let _ = 1; }}\n", filler, n))
                .collect();
            let mut chunker = Chunker::fixed(target, target / 4);
            chunker.splitters = SplitterRegistry::with_defaults();
            let chunks = chunker.chunk(&text, Some("rust"));
            prop_assert_eq!(reconstruct(&chunks), text);
        }
    }
}
