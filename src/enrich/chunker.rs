//! Overlapping windows over long page bodies, one provider prompt each.

/// Window size and overlap, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkSpec {
    /// Overlap is capped at half the window so every window advances.
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size / 2),
        }
    }
}

impl Default for ChunkSpec {
    fn default() -> Self {
        Self::new(2000, 200)
    }
}

fn is_break(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | '!' | '?' | '。')
}

/// Split `text` into windows of at most `spec.size` characters.
///
/// A window ends at the last whitespace or sentence mark within its final
/// fifth when one exists; the next window starts `spec.overlap` characters
/// before that end. Slicing always lands on char boundaries.
pub fn chunk_text(text: &str, spec: ChunkSpec) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let total = chars.len();
    let byte_at = |i: usize| chars.get(i).map(|(b, _)| *b).unwrap_or(text.len());

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total {
        let mut end = (start + spec.size).min(total);
        if end < total {
            let floor = end - spec.size / 5;
            if let Some(brk) = (floor..end).rev().find(|&i| is_break(chars[i].1)) {
                end = brk + 1;
            }
        }

        let piece = text[byte_at(start)..byte_at(end)].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        if end >= total {
            break;
        }

        let next = end.saturating_sub(spec.overlap);
        start = if next > start { next } else { end };
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("  one short paragraph  ", ChunkSpec::new(100, 10));
        assert_eq!(chunks, vec!["one short paragraph"]);
        assert!(chunk_text("   ", ChunkSpec::default()).is_empty());
    }

    #[test]
    fn test_windows_respect_size_and_cover_text() {
        let text = "alpha beta gamma delta. ".repeat(40);
        let spec = ChunkSpec::new(100, 20);
        let chunks = chunk_text(&text, spec);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert!(chunks[0].starts_with("alpha"));
        assert!(text.trim_end().ends_with(chunks.last().unwrap().as_str()));
    }

    #[test]
    fn test_windows_break_on_whitespace() {
        let text = "word ".repeat(100);
        for chunk in chunk_text(&text, ChunkSpec::new(42, 0)) {
            assert!(chunk.split(' ').all(|w| w == "word"));
        }
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let text: String = (0..60).map(|i| format!("w{:02} ", i)).collect();
        let chunks = chunk_text(&text, ChunkSpec::new(40, 8));
        let first_tail = chunks[0].split(' ').last().unwrap();
        assert!(chunks[1].contains(first_tail));
    }

    #[test]
    fn test_multibyte_text_never_splits_chars() {
        let text = "김철수님이 배포 계획을 검토했습니다. ".repeat(30);
        let chunks = chunk_text(&text, ChunkSpec::new(25, 5));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 25));
    }

    #[test]
    fn test_unbroken_text_still_advances() {
        let text = "x".repeat(250);
        let chunks = chunk_text(&text, ChunkSpec::new(100, 500));
        assert_eq!(ChunkSpec::new(100, 500).overlap, 50);
        assert_eq!(chunks[0].len(), 100);
        assert!(chunks.len() <= 5);
    }
}
