//! Source citations for an answer.

use crate::rag::types::Citation;
use crate::text::truncate_chars;
use crate::types::RetrievedChunk;

/// Maps the chunks an answer used to user-facing citations.
#[derive(Debug, Clone, Copy)]
pub struct CitationBuilder {
    excerpt_chars: usize,
}

impl CitationBuilder {
    pub fn new(excerpt_chars: usize) -> Self {
        Self { excerpt_chars }
    }

    /// One citation per used chunk, in rank order.
    pub fn build(&self, used_chunks: &[RetrievedChunk]) -> Vec<Citation> {
        used_chunks
            .iter()
            .enumerate()
            .map(|(position, chunk)| Citation {
                document_id: chunk.document_id.clone(),
                title: chunk.title.clone(),
                chunk_index: chunk.chunk.chunk_index,
                excerpt: truncate_chars(&chunk.chunk.text, self.excerpt_chars),
                relevance_score: positional_score(position),
            })
            .collect()
    }
}

impl Default for CitationBuilder {
    fn default() -> Self {
        Self::new(200)
    }
}

/// 1.0 for the first position, 0.1 less for each later one, never below 0.
fn positional_score(position: usize) -> f64 {
    (10 - position.min(10)) as f64 / 10.0
}
