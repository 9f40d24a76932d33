//! Overlapping-window text chunker.
//!
//! Splits a document body into chunks of at most `chunk_size` bytes, with
//! consecutive chunks from the same document sharing `chunk_overlap`
//! trailing/leading bytes so retrieval never loses context at a cut.
//!
//! # Algorithm
//!
//! 1. Open a window of `chunk_size` bytes at the current start offset
//!    (snapped back to a UTF-8 char boundary).
//! 2. If the window reaches the end of the text, emit the remainder and stop.
//! 3. Otherwise pick a cut point inside the window, preferring natural
//!    boundaries in order: paragraph (`\n\n`), sentence end, word break.
//!    A boundary is only usable if it lies past the overlap region, so the
//!    windows always advance. With no usable boundary, cut hard at the
//!    window edge.
//! 4. Emit `text[start..cut]` and restart at `cut - chunk_overlap`.
//!
//! Identical input and parameters always produce an identical chunk
//! sequence; there is no randomness anywhere in this module.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, SourceDocument};

/// Split one document into overlapping chunks.
///
/// Guarantees:
/// - At least one chunk is always returned (even for empty text).
/// - Every chunk is at most `chunk_size` bytes.
/// - Consecutive chunks share at least `chunk_overlap` bytes, except that
///   the final chunk may fall short when the remainder is small.
/// - Positions are contiguous: `0, 1, 2, …`.
///
/// `chunk_overlap` must be smaller than `chunk_size`; config validation
/// enforces this before the chunker ever runs.
pub fn chunk_document(doc: &SourceDocument, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let text = doc.body.as_str();
    let mut chunks = Vec::new();
    let mut position: i64 = 0;
    let mut start = 0usize;

    if text.is_empty() {
        return vec![make_chunk(&doc.origin, 0, "")];
    }

    loop {
        let mut window_end = snap_to_char_boundary(text, start.saturating_add(chunk_size));
        if window_end <= start {
            // Pathologically small chunk_size against a multibyte char:
            // take exactly one char so the loop always advances.
            window_end = text[start..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| start + i)
                .unwrap_or(text.len());
        }
        if window_end >= text.len() {
            let piece = &text[start..];
            if !piece.trim().is_empty() || chunks.is_empty() {
                chunks.push(make_chunk(&doc.origin, position, piece));
            }
            break;
        }

        // A cut at or before this offset would not advance past the overlap
        // carried into the next window.
        let min_cut = start + chunk_overlap;
        let cut = find_cut(text, start, window_end, min_cut);

        let piece = &text[start..cut];
        if !piece.trim().is_empty() {
            chunks.push(make_chunk(&doc.origin, position, piece));
            position += 1;
        }

        start = snap_to_char_boundary(text, cut - chunk_overlap.min(cut - start - 1));
        if start >= text.len() {
            break;
        }
    }

    chunks
}

/// Chunk an ordered sequence of documents, preserving document order.
pub fn chunk_documents(
    docs: &[SourceDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    docs.iter()
        .flat_map(|doc| chunk_document(doc, chunk_size, chunk_overlap))
        .collect()
}

/// Pick the best cut point in `text[start..window_end]`.
///
/// Prefers the last paragraph break, then the last sentence end, then the
/// last word break, each only if it lands strictly past `min_cut`. Falls
/// back to the (char-snapped) window edge.
fn find_cut(text: &str, start: usize, window_end: usize, min_cut: usize) -> usize {
    let window = &text[start..window_end];

    if let Some(pos) = window.rfind("\n\n") {
        let cut = start + pos + 2;
        if cut > min_cut {
            return cut;
        }
    }

    let mut best_sentence = 0usize;
    for pat in [". ", "! ", "? ", "\n"] {
        if let Some(pos) = window.rfind(pat) {
            best_sentence = best_sentence.max(start + pos + pat.len());
        }
    }
    if best_sentence > min_cut {
        return best_sentence;
    }

    if let Some(pos) = window.rfind(' ') {
        let cut = start + pos + 1;
        if cut > min_cut {
            return cut;
        }
    }

    window_end
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(origin: &str, position: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        origin: origin.to_string(),
        position,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(origin: &str, body: &str) -> SourceDocument {
        SourceDocument {
            origin: origin.to_string(),
            page: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_document(&doc("a.txt", "Hello, world!"), 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].origin, "a.txt");
    }

    #[test]
    fn empty_text_still_yields_one_chunk() {
        let chunks = chunk_document(&doc("a.txt", ""), 1000, 200);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn chunks_never_exceed_chunk_size() {
        let body = "word ".repeat(500);
        let chunks = chunk_document(&doc("a.txt", &body), 100, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 100, "chunk too long: {}", c.text.len());
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let body = "word ".repeat(500);
        let overlap = 20;
        let chunks = chunk_document(&doc("a.txt", &body), 100, overlap);
        for pair in chunks.windows(2) {
            let prev = &pair[0].text;
            let next = &pair[1].text;
            let tail = &prev[prev.len() - overlap..];
            assert!(
                next.starts_with(tail),
                "expected {:?} to start with {:?}",
                next,
                tail
            );
        }
    }

    #[test]
    fn overlap_holds_across_paragraph_cuts() {
        let body = "First sentence of the paragraph. Second sentence follows it.\n\n".repeat(20);
        let overlap = 40;
        let chunks = chunk_document(&doc("a.txt", &body), 200, overlap);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev = &pair[0].text;
            let next = &pair[1].text;
            assert!(prev.len() <= 200);
            let tail = &prev[prev.len() - overlap..];
            assert!(
                next.starts_with(tail),
                "expected {:?} to start with {:?}",
                next,
                tail
            );
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let body = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = chunk_document(&doc("a.txt", &body), 100, 10);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.ends_with("\n\n"));
        assert!(chunks[1].text.contains("bbb"));
    }

    #[test]
    fn prefers_word_breaks_over_hard_cuts() {
        let body = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunk_document(&doc("a.txt", body), 30, 5);
        // Every non-final chunk should end at a word break, never mid-word.
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.text.ends_with(' '), "severed word in {:?}", c.text);
        }
    }

    #[test]
    fn hard_cut_on_unbroken_text() {
        let body = "x".repeat(250);
        let chunks = chunk_document(&doc("a.txt", &body), 100, 10);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(c.text.len() <= 100);
        }
    }

    #[test]
    fn positions_contiguous() {
        let body = "word ".repeat(300);
        let chunks = chunk_document(&doc("a.txt", &body), 80, 16);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i as i64);
        }
    }

    #[test]
    fn multibyte_utf8_never_panics() {
        let body = "日本語のテキスト。".repeat(100);
        let chunks = chunk_document(&doc("a.txt", &body), 90, 30);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.len() <= 90);
        }
    }

    #[test]
    fn deterministic() {
        let body = "Alpha.\n\nBeta.\n\nGamma.\n\nDelta. ".repeat(20);
        let a = chunk_document(&doc("a.txt", &body), 120, 24);
        let b = chunk_document(&doc("a.txt", &body), 120, 24);
        assert_eq!(a, b);
    }

    #[test]
    fn multiple_documents_keep_their_origins() {
        let docs = vec![doc("a.txt", "First document."), doc("b.md", "Second document.")];
        let chunks = chunk_documents(&docs, 1000, 200);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].origin, "a.txt");
        assert_eq!(chunks[1].origin, "b.md");
    }
}
