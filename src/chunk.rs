//! Paragraph-boundary text chunker.
//!
//! Splits converted document text into [`Chunk`]s that respect a
//! configurable `max_tokens` limit. Splitting occurs on paragraph
//! boundaries (`\n\n`) to preserve semantic coherence within each chunk;
//! an oversized paragraph is hard-split at whitespace.

use crate::models::Chunk;

/// Approximate chars-per-token ratio, shared with the token estimator.
pub const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0; whitespace-only
/// input yields no chunks.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index: i64 = 0;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // If adding this paragraph would exceed max, flush current buffer
        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len() // +2 for \n\n separator
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(make_chunk(&mut chunk_index, &current_buf));
            current_buf.clear();
        }

        // A single paragraph over the limit gets hard-split
        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                chunks.push(make_chunk(&mut chunk_index, &current_buf));
                current_buf.clear();
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let mut split_at = remaining.len().min(max_chars);
                // Clamp to a char boundary; multibyte text must never be
                // split mid-character
                while split_at > 0 && !remaining.is_char_boundary(split_at) {
                    split_at -= 1;
                }
                if split_at == 0 {
                    split_at = remaining
                        .chars()
                        .next()
                        .map(|c| c.len_utf8())
                        .unwrap_or(remaining.len());
                }
                // Prefer a newline or space boundary within the window
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = remaining[..actual_split].trim();
                if !piece.is_empty() {
                    chunks.push(make_chunk(&mut chunk_index, piece));
                }
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(make_chunk(&mut chunk_index, &current_buf));
    }

    chunks
}

fn make_chunk(index: &mut i64, text: &str) -> Chunk {
    let chunk = Chunk {
        index: *index,
        text: text.to_string(),
    };
    *index += 1;
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 700).is_empty());
        assert!(chunk_text("  \n\n \n", 700).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 700);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn test_multiple_paragraphs_exceed_limit() {
        // max_tokens=5 => max_chars=20
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text(text, 5);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as i64);
        }
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        // One paragraph with no blank lines, longer than the window
        let text = "word ".repeat(100);
        let chunks = chunk_text(text.trim(), 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 40);
        }
    }

    #[test]
    fn test_oversized_multibyte_paragraph_splits_on_char_boundaries() {
        // 100 three-byte chars, no whitespace; max_tokens=5 => 20-byte window
        let text = "あ".repeat(100);
        let chunks = chunk_text(&text, 5);
        assert!(chunks.len() > 1);
        let total: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
        assert_eq!(total, 100);
        for c in &chunks {
            assert!(c.text.chars().all(|ch| ch == 'あ'));
        }
    }

    #[test]
    fn test_window_smaller_than_one_char_still_advances() {
        // max_tokens=0 is rejected by config validation; the chunker itself
        // must still terminate on a degenerate window
        let chunks = chunk_text("日本語", 0);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text(&text, 10);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text(text, 5);
        let c2 = chunk_text(text, 5);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.index, b.index);
        }
    }
}
