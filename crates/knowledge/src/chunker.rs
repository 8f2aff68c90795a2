//! Text chunking with a fixed window, fixed overlap and sentence snapping.
//!
//! Windows are measured in characters. When a window ends before the end of
//! the text, the chunk is cut after the last `.`, `?`, `!` or newline in the
//! second half of the window instead of at the raw boundary.

use crate::config::ChunkingConfig;
use crate::types::Chunk;

const SENTENCE_BREAKS: [char; 4] = ['.', '?', '!', '\n'];

/// Splits extracted text into overlapping chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    window: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(window: usize, overlap: usize) -> Self {
        Self {
            window: window.max(1),
            overlap,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Lazily walk `text`, yielding chunk spans in order.
    ///
    /// The text is trimmed first; spans index into the trimmed text.
    pub fn spans<'a>(&self, text: &'a str) -> ChunkSpans<'a> {
        let text = text.trim();
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());

        ChunkSpans {
            text,
            offsets,
            window: self.window,
            overlap: self.overlap,
            start: 0,
            next_index: 0,
            done: text.is_empty(),
        }
    }

    /// Chunk `text` into an ordered list.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self.spans(text).map(ChunkSpan::into_chunk).collect();

        tracing::debug!(
            "Chunked text into {} chunks (size: {}, overlap: {})",
            chunks.len(),
            self.window,
            self.overlap
        );

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

/// One chunk with its character range in the (trimmed) source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan<'a> {
    pub chunk_index: u32,
    /// Start character offset (inclusive).
    pub start: usize,
    /// End character offset (exclusive).
    pub end: usize,
    pub text: &'a str,
}

impl ChunkSpan<'_> {
    pub fn into_chunk(self) -> Chunk {
        Chunk::new(self.text, self.chunk_index)
    }
}

/// Finite, non-restartable iterator returned by [`Chunker::spans`].
#[derive(Debug)]
pub struct ChunkSpans<'a> {
    text: &'a str,
    /// Byte offset of every character, plus the text length.
    offsets: Vec<usize>,
    window: usize,
    overlap: usize,
    start: usize,
    next_index: u32,
    done: bool,
}

impl<'a> ChunkSpans<'a> {
    fn char_len(&self) -> usize {
        self.offsets.len() - 1
    }

    fn char_at(&self, index: usize) -> Option<char> {
        self.text[self.offsets[index]..].chars().next()
    }

    /// Character index just past the last sentence break in the second half
    /// of `[start, end)`, if any.
    fn snap_to_sentence(&self, start: usize, end: usize) -> Option<usize> {
        let half = start + self.window / 2;
        (half..end)
            .rev()
            .find(|&i| self.char_at(i).is_some_and(|c| SENTENCE_BREAKS.contains(&c)))
            .map(|i| i + 1)
    }
}

impl<'a> Iterator for ChunkSpans<'a> {
    type Item = ChunkSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.char_len();
        if self.done || self.start >= len {
            self.done = true;
            return None;
        }

        let start = self.start;
        let mut end = (start + self.window).min(len);
        if end < len {
            if let Some(snapped) = self.snap_to_sentence(start, end) {
                end = snapped;
            }
        }

        let text: &'a str = self.text;
        let span = ChunkSpan {
            chunk_index: self.next_index,
            start,
            end,
            text: &text[self.offsets[start]..self.offsets[end]],
        };
        self.next_index += 1;

        if end >= len {
            self.done = true;
        } else {
            let next_start = end.saturating_sub(self.overlap);
            self.start = if next_start <= start { end } else { next_start };
        }

        Some(span)
    }
}
