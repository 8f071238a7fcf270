//! Line-based chunking of extracted text.
//!
//! Documents are cut into windows of at most `max_lines` lines. Splitting
//! ignores sentence and paragraph structure entirely; a chunk may end in the
//! middle of a function or a paragraph.

use serde::{Deserialize, Serialize};

/// Default number of lines per chunk.
pub const DEFAULT_MAX_LINES: usize = 20;

/// Default number of lines shared by adjacent chunks.
pub const DEFAULT_OVERLAP_LINES: usize = 0;

/// Chunking parameters.
///
/// # Examples
///
/// ```
/// use docrag::chunking::{ChunkingConfig, DEFAULT_MAX_LINES};
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.max_lines, DEFAULT_MAX_LINES);
/// assert_eq!(config.overlap_lines, 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum number of lines in a chunk. Zero is treated as one.
    pub max_lines: usize,
    /// Lines repeated at the start of the next chunk.
    pub overlap_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            overlap_lines: DEFAULT_OVERLAP_LINES,
        }
    }
}

impl ChunkingConfig {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            overlap_lines: DEFAULT_OVERLAP_LINES,
        }
    }

    pub fn with_overlap(mut self, overlap_lines: usize) -> Self {
        self.overlap_lines = overlap_lines;
        self
    }

    /// Split `text` according to this configuration.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let lines: Vec<&str> = text.lines().collect();
        let size = self.max_lines.max(1);
        let step = size.saturating_sub(self.overlap_lines).max(1);

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < lines.len() {
            let end = (start + size).min(lines.len());
            chunks.push(lines[start..end].join("\n"));
            if end == lines.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

/// Split `text` into consecutive, non-overlapping chunks of at most
/// `max_lines` lines each.
///
/// Lines are rejoined with `\n`, so `\r\n` endings are normalized and a
/// trailing newline does not produce an extra chunk. Empty text yields no
/// chunks.
///
/// # Examples
///
/// ```
/// use docrag::chunking::chunk_lines;
///
/// let text = (1..=45).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
/// let chunks = chunk_lines(&text, 20);
/// assert_eq!(chunks.len(), 3);
/// assert_eq!(chunks[2].lines().count(), 5);
///
/// assert!(chunk_lines("", 20).is_empty());
/// ```
pub fn chunk_lines(text: &str, max_lines: usize) -> Vec<String> {
    ChunkingConfig::new(max_lines).chunk(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (1..=n)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn forty_five_lines_make_three_chunks() {
        let chunks = chunk_lines(&numbered(45), 20);
        let sizes: Vec<usize> =
            chunks.iter().map(|c| c.lines().count()).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert!(chunks[0].starts_with("line 1\n"));
        assert!(chunks[1].starts_with("line 21\n"));
        assert_eq!(chunks[2].lines().last(), Some("line 45"));
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_lines("", 20).is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_lines("def f():\n    return 1\n", 20);
        assert_eq!(chunks, vec!["def f():\n    return 1".to_string()]);
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_chunk() {
        let chunks = chunk_lines(&numbered(40), 20);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn chunks_rejoin_to_the_original_lines() {
        let text = numbered(57);
        let chunks = chunk_lines(&text, 7);
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn crlf_is_normalized() {
        let chunks = chunk_lines("a\r\nb\r\nc", 2);
        assert_eq!(chunks, vec!["a\nb".to_string(), "c".to_string()]);
    }

    #[test]
    fn blank_lines_are_kept() {
        let chunks = chunk_lines("a\n\n\nb", 2);
        assert_eq!(chunks, vec!["a\n".to_string(), "\nb".to_string()]);
    }

    #[test]
    fn zero_max_lines_means_one_line_per_chunk() {
        let chunks = chunk_lines("a\nb\nc", 0);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn overlap_repeats_trailing_lines() {
        let config = ChunkingConfig::new(4).with_overlap(2);
        let chunks = config.chunk(&numbered(8));

        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].starts_with("line 3\n"));
        assert!(chunks[2].starts_with("line 5\n"));
        assert_eq!(chunks[2].lines().last(), Some("line 8"));
    }

    #[test]
    fn overlap_not_smaller_than_size_still_advances() {
        let config = ChunkingConfig::new(2).with_overlap(5);
        let chunks = config.chunk(&numbered(3));
        assert_eq!(chunks.len(), 2);
    }
}
