//! Deterministic, boundary-aware text chunking.
//!
//! Splits cleaned document text into ordered, bounded-size knowledge points.
//! The splitter prefers sentence or line boundaries inside each window and
//! falls back to a hard cut when no usable boundary exists, so output is a
//! pure function of `(text, params)`.

use point_model::{DocumentId, KnowledgePoint};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunking configuration: {message}")]
    InvalidConfig { message: String },
}

/// Window size and overlap for the splitter, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub target_size: usize,
    pub overlap: usize,
}

impl ChunkParams {
    /// Build params with the derived default overlap of one fifth of the
    /// window size.
    pub fn new(target_size: usize) -> Self {
        Self { target_size, overlap: default_overlap(target_size) }
    }

    pub fn with_overlap(target_size: usize, overlap: usize) -> Self {
        Self { target_size, overlap }
    }

    /// Reject configurations that cannot make progress.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.target_size == 0 {
            return Err(ChunkError::InvalidConfig {
                message: "target_size must be greater than zero".into(),
            });
        }
        if self.overlap >= self.target_size {
            return Err(ChunkError::InvalidConfig {
                message: format!(
                    "overlap {} must be smaller than target_size {}",
                    self.overlap, self.target_size
                ),
            });
        }
        Ok(())
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self::new(500)
    }
}

fn default_overlap(target_size: usize) -> usize {
    (target_size as f64 / 5.0).round() as usize
}

/// Split `text` into ordered chunks of at most `target_size` characters.
///
/// Each window is cut at the last sentence terminator (`.`) or newline when
/// that boundary sits past the midpoint of the window; otherwise the window
/// is cut hard at `target_size`. Consecutive chunks overlap by
/// `params.overlap` characters. Offsets are character counts, so multi-byte
/// input is never cut mid-character.
pub fn chunk_text(text: &str, params: &ChunkParams) -> Result<Vec<String>, ChunkError> {
    params.validate()?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= params.target_size {
        return Ok(vec![text.to_string()]);
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let mut end = start + params.target_size;
        if end >= chars.len() {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let window = &chars[start..end];
        let last_period = window.iter().rposition(|&c| c == '.');
        let last_newline = window.iter().rposition(|&c| c == '\n');
        let break_point = match (last_period, last_newline) {
            (Some(p), Some(n)) => Some(p.max(n)),
            (Some(p), None) => Some(p),
            (None, Some(n)) => Some(n),
            (None, None) => None,
        };
        if let Some(bp) = break_point {
            if bp > params.target_size / 2 {
                end = start + bp + 1;
            }
        }

        chunks.push(chars[start..end].iter().collect());
        let next = end.saturating_sub(params.overlap);
        // Guard against a non-advancing window when the overlap exceeds the
        // length of a boundary-cut chunk.
        start = if next > start { next } else { end };
    }

    Ok(chunks)
}

/// Structure a cleaned document into ordered knowledge points with
/// contiguous chunk indices starting at zero.
pub fn structure_document(
    text: &str,
    document_id: &DocumentId,
    params: &ChunkParams,
) -> Result<Vec<KnowledgePoint>, ChunkError> {
    let chunks = chunk_text(text, params)?;
    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, content)| KnowledgePoint::new(document_id.clone(), i as u32, content))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(target: usize, overlap: usize) -> ChunkParams {
        ChunkParams::with_overlap(target, overlap)
    }

    #[test]
    fn short_text_passes_through_unsplit() {
        let p = params(50, 10);
        let out = chunk_text("short input", &p).unwrap();
        assert_eq!(out, vec!["short input".to_string()]);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let out = chunk_text("", &ChunkParams::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn zero_target_size_is_rejected() {
        let err = chunk_text("abc", &params(0, 0)).unwrap_err();
        assert!(matches!(err, ChunkError::InvalidConfig { .. }));
    }

    #[test]
    fn overlap_at_or_above_target_is_rejected() {
        assert!(chunk_text("abc", &params(10, 10)).is_err());
        assert!(chunk_text("abc", &params(10, 11)).is_err());
    }

    #[test]
    fn default_overlap_is_fifth_of_target() {
        assert_eq!(ChunkParams::new(500).overlap, 100);
        assert_eq!(ChunkParams::new(1000).overlap, 200);
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let text = "one. two. three. four. five. six. seven. eight. nine. ten.".repeat(8);
        let p = params(60, 12);
        let a = chunk_text(&text, &p).unwrap();
        let b = chunk_text(&text, &p).unwrap();
        assert_eq!(a, b);
        assert!(a.len() > 1);
    }

    #[test]
    fn cuts_at_late_sentence_boundary() {
        // A period past the window midpoint ends the chunk right after it.
        let text = format!("{}. {}", "a".repeat(40), "b".repeat(60));
        let p = params(50, 5);
        let out = chunk_text(&text, &p).unwrap();
        assert_eq!(out[0], format!("{}.", "a".repeat(40)));
    }

    #[test]
    fn early_boundary_forces_hard_cut() {
        // Only boundary is at the window midpoint or earlier: full window cut.
        let text = format!("{}. {}", "a".repeat(10), "b".repeat(100));
        let p = params(50, 5);
        let out = chunk_text(&text, &p).unwrap();
        assert_eq!(out[0].chars().count(), 50);
    }

    #[test]
    fn newline_counts_as_boundary() {
        let text = format!("{}\n{}", "a".repeat(40), "b".repeat(60));
        let p = params(50, 5);
        let out = chunk_text(&text, &p).unwrap();
        assert_eq!(out[0], format!("{}\n", "a".repeat(40)));
    }

    #[test]
    fn consecutive_chunks_overlap_by_configured_amount() {
        let text = "x".repeat(200);
        let p = params(50, 10);
        let out = chunk_text(&text, &p).unwrap();
        for pair in out.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            let tail: String = prev[prev.len() - 10..].iter().collect();
            let head: String = next[..10.min(next.len())].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn trimmed_chunks_reconstruct_the_original() {
        // Dropping the overlap from every chunk but the first must replay the
        // input exactly: hard cuts and boundary cuts both advance end-overlap.
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
        let p = params(80, 16);
        let out = chunk_text(&text, &p).unwrap();
        let mut rebuilt: String = out[0].clone();
        for chunk in &out[1..] {
            let chars: Vec<char> = chunk.chars().collect();
            rebuilt.extend(&chars[p.overlap.min(chars.len())..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_is_never_cut_mid_character() {
        let text = "日本語のテキストです。".repeat(40);
        let p = params(30, 6);
        let out = chunk_text(&text, &p).unwrap();
        assert!(out.len() > 1);
        for chunk in &out {
            assert!(chunk.chars().count() <= 30 + 1);
        }
    }

    #[test]
    fn structure_document_assigns_contiguous_indices() {
        let doc = DocumentId::new("55");
        let text = "Sentence one. Sentence two. Sentence three. Sentence four.".repeat(10);
        let points = structure_document(&text, &doc, &params(60, 12)).unwrap();
        assert!(points.len() > 1);
        for (i, kp) in points.iter().enumerate() {
            assert_eq!(kp.chunk_index(), i as u32);
            assert_eq!(kp.document_id(), &doc);
            assert_eq!(kp.id.to_string(), format!("55_chunk_{i}"));
            assert!(!kp.content.is_empty());
            assert!(kp.tags.is_empty());
        }
    }
}
