//! Recursive character text splitting.

use std::collections::VecDeque;

use thiserror::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 1_000;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Splits text into overlapping chunks of at most `chunk_size` characters.
///
/// The text is cut at the coarsest separator present (paragraph, line,
/// word, then character), recursing into pieces that are still too long.
/// Pieces are then packed greedily; when a chunk is emitted, trailing pieces
/// totalling at most `chunk_overlap` characters are carried into the next.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for RecursiveCharacterSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl RecursiveCharacterSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);
        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.trim().to_string());
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks.retain(|c| !c.is_empty());
        chunks
    }

    /// Pack pieces into chunks, carrying an overlap window between them.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        push_trimmed(&mut chunks, &window);
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// First separator that occurs in `text`, plus the finer ones after it.
fn pick_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Split so that each separator stays at the start of the piece after it.
/// An empty separator splits into single characters.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i:03}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(RecursiveCharacterSplitter::default().split("").is_empty());
        assert!(RecursiveCharacterSplitter::default().split(" \n\n ").is_empty());
    }

    #[test]
    fn short_text_is_one_trimmed_chunk() {
        let chunks = RecursiveCharacterSplitter::default().split("  Chapter One\n\nIntro  ");
        assert_eq!(chunks, vec!["Chapter One\n\nIntro"]);
    }

    #[test]
    fn chunks_respect_size_limit() {
        let splitter = RecursiveCharacterSplitter::new(50, 10).unwrap();
        let text = words(200);
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let splitter = RecursiveCharacterSplitter::new(40, 12).unwrap();
        let chunks = splitter.split(&words(60));
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').next_back().unwrap();
            assert!(
                pair[1].contains(last_word),
                "{:?} does not carry over {:?}",
                pair[1],
                last_word
            );
        }
    }

    #[test]
    fn every_word_survives_splitting() {
        let splitter = RecursiveCharacterSplitter::new(30, 5).unwrap();
        let text = words(80);
        let chunks = splitter.split(&text);
        for word in text.split(' ') {
            assert!(chunks.iter().any(|c| c.contains(word)), "lost {word}");
        }
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let splitter = RecursiveCharacterSplitter::new(30, 0).unwrap();
        let chunks = splitter.split("First paragraph here.\n\nSecond paragraph here.");
        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn unbreakable_runs_fall_back_to_characters() {
        let splitter = RecursiveCharacterSplitter::new(10, 2).unwrap();
        let chunks = splitter.split(&"x".repeat(25));
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.first().map(|c| c.len()), Some(10));
    }

    #[test]
    fn multibyte_text_is_measured_in_chars() {
        let splitter = RecursiveCharacterSplitter::new(5, 1).unwrap();
        let chunks = splitter.split("अआइईउऊ");
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert_eq!(
            RecursiveCharacterSplitter::new(0, 0).unwrap_err(),
            ChunkingError::ZeroChunkSize
        );
        assert_eq!(
            RecursiveCharacterSplitter::new(100, 100).unwrap_err(),
            ChunkingError::OverlapTooLarge {
                size: 100,
                overlap: 100
            }
        );
    }

    #[test]
    fn separator_stays_with_following_piece() {
        assert_eq!(split_keeping_separator("a b c", " "), vec!["a", " b", " c"]);
        assert_eq!(split_keeping_separator("\n\nx", "\n\n"), vec!["\n\nx"]);
    }
}
