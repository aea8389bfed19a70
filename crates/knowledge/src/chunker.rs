//! Text chunking with configurable size and overlap.
//!
//! Positions and sizes are counted in characters of the whitespace-normalized
//! text, never in bytes, so multi-byte input cannot split a code point.

use crate::config::KnowledgeBaseConfig;
use crate::types::ChunkCandidate;
use serde_json::{json, Map, Value};

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_chunks: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            max_chunks: 1000,
        }
    }
}

impl From<&KnowledgeBaseConfig> for ChunkOptions {
    fn from(config: &KnowledgeBaseConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            max_chunks: config.max_chunks,
        }
    }
}

/// Collapse every whitespace run to a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Chunk text into overlapping, boundary-respecting segments.
///
/// Cuts prefer the last sentence terminator in the second half of the
/// window, then the last whitespace, then a hard cut at `chunk_size`.
/// Every chunk carries `metadata` merged with `chunkIndex`,
/// `startPosition`, `endPosition` and `totalChunks`.
pub fn chunk_text(text: &str, options: &ChunkOptions, metadata: &Value) -> Vec<ChunkCandidate> {
    let cleaned = normalize_whitespace(text);
    if cleaned.is_empty() {
        return vec![];
    }

    let chars: Vec<char> = cleaned.chars().collect();
    let len = chars.len();
    let chunk_size = options.chunk_size.max(1);

    let mut chunks = Vec::new();

    if len <= chunk_size {
        chunks.push(candidate(0, cleaned, 0, len, metadata));
    } else {
        let mut start = 0;
        let mut covered = 0;

        while start < len && chunks.len() < options.max_chunks {
            let end = if start + chunk_size < len {
                find_break(&chars, start, start + chunk_size, chunk_size)
            } else {
                len
            };

            let span: String = chars[start..end].iter().collect();
            let trimmed = span.trim();
            if !trimmed.is_empty() {
                let index = chunks.len() as u32;
                chunks.push(candidate(index, trimmed.to_string(), start, end, metadata));
            }

            covered = end;
            if end >= len {
                break;
            }
            start = next_start(start, end, options.chunk_overlap);
        }

        if covered < len {
            tracing::warn!(
                "Chunk limit of {} reached; {} trailing characters were not chunked",
                options.max_chunks,
                len - covered
            );
        }
    }

    let total = chunks.len();
    for chunk in &mut chunks {
        if let Some(fields) = chunk.metadata.as_object_mut() {
            fields.insert("totalChunks".to_string(), json!(total));
        }
    }

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        total,
        options.chunk_size,
        options.chunk_overlap
    );

    chunks
}

/// Choose the cut point for the window `[start, end)`.
fn find_break(chars: &[char], start: usize, end: usize, chunk_size: usize) -> usize {
    let threshold = start + chunk_size.div_ceil(2);

    let sentence_end = (start..end)
        .rev()
        .find(|&i| matches!(chars[i], '.' | '!' | '?'))
        .map(|i| i + 1);

    if let Some(boundary) = sentence_end {
        if boundary >= threshold {
            return boundary;
        }
    }

    ((start + 1)..end)
        .rev()
        .find(|&i| chars[i].is_whitespace())
        .unwrap_or(end)
}

/// Next window start: back off by the overlap without reopening a gap or stalling.
fn next_start(start: usize, end: usize, overlap: usize) -> usize {
    let candidate = end.saturating_sub(overlap);
    if candidate > start {
        candidate
    } else {
        end
    }
}

fn candidate(index: u32, text: String, start: usize, end: usize, metadata: &Value) -> ChunkCandidate {
    let mut fields = match metadata {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    fields.insert("chunkIndex".to_string(), json!(index));
    fields.insert("startPosition".to_string(), json!(start));
    fields.insert("endPosition".to_string(), json!(end));

    ChunkCandidate {
        local_index: index,
        text,
        start,
        end,
        metadata: Value::Object(fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(chunk_size: usize, chunk_overlap: usize) -> ChunkOptions {
        ChunkOptions {
            chunk_size,
            chunk_overlap,
            max_chunks: 1000,
        }
    }

    fn texts(chunks: &[ChunkCandidate]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("", &options(100, 10), &json!({})).is_empty());
        assert!(chunk_text(" \n\t ", &options(100, 10), &json!({})).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("  Hello\n\n  world.  ", &options(100, 10), &json!({}));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].local_index, 0);
        assert_eq!(chunks[0].text, "Hello world.");
        assert_eq!(chunks[0].metadata["totalChunks"], 1);
    }

    #[test]
    fn test_sentence_boundaries_preferred() {
        let chunks = chunk_text("A. B. C.", &options(4, 0), &json!({}));
        assert_eq!(texts(&chunks), vec!["A.", "B.", "C."]);
        assert_eq!(chunks[2].local_index, 2);
    }

    #[test]
    fn test_word_boundary_when_no_sentence() {
        let chunks = chunk_text("hello world foo", &options(8, 0), &json!({}));
        assert_eq!(texts(&chunks), vec!["hello", "world", "foo"]);
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "a".repeat(300);
        let chunks = chunk_text(&text, &options(100, 0), &json!({}));

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.text.len() == 100));
    }

    #[test]
    fn test_spans_cover_text_without_gaps() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let normalized = normalize_whitespace(&text);
        let len = normalized.chars().count();
        let chunks = chunk_text(&text, &options(120, 30), &json!({}));

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].start, 0);
        for pair in chunks.windows(2) {
            assert!(pair[1].start > pair[0].start, "windows must advance");
            assert!(pair[1].start <= pair[0].end, "windows must not leave a gap");
        }
        assert_eq!(chunks.last().unwrap().end, len);
    }

    #[test]
    fn test_overlap_shares_text() {
        let text = "a".repeat(300);
        let chunks = chunk_text(&text, &options(100, 10), &json!({}));

        assert_eq!(chunks[1].start, 90);
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn test_overlap_not_smaller_than_size_still_progresses() {
        let text = "word ".repeat(50);
        let chunks = chunk_text(&text, &options(10, 10), &json!({}));

        assert!(!chunks.is_empty());
        for pair in chunks.windows(2) {
            assert!(pair[1].start > pair[0].start);
        }
    }

    #[test]
    fn test_max_chunks_cap() {
        let text = "a".repeat(1000);
        let capped = ChunkOptions {
            chunk_size: 10,
            chunk_overlap: 0,
            max_chunks: 5,
        };
        let chunks = chunk_text(&text, &capped, &json!({}));

        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.metadata["totalChunks"] == 5));
    }

    #[test]
    fn test_metadata_merged() {
        let text = "First sentence here. Second sentence here. Third one.";
        let chunks = chunk_text(
            text,
            &options(25, 0),
            &json!({"title": "Notes", "type": "txt"}),
        );

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata["title"], "Notes");
            assert_eq!(chunk.metadata["chunkIndex"], i);
            assert_eq!(chunk.metadata["startPosition"], chunk.start);
            assert_eq!(chunk.metadata["endPosition"], chunk.end);
            assert_eq!(chunk.metadata["totalChunks"], chunks.len());
        }
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let text = "é".repeat(25);
        let chunks = chunk_text(&text, &options(10, 0), &json!({}));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.chars().count(), 10);
        assert_eq!(chunks[2].text.chars().count(), 5);
    }

    #[test]
    fn test_options_from_config() {
        let config = KnowledgeBaseConfig::default();
        let opts = ChunkOptions::from(&config);
        assert_eq!(opts, ChunkOptions::default());
    }
}
