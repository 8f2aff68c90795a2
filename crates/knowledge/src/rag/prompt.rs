//! Grounding context assembly for the answer prompt.

use crate::text::truncate_chars;
use crate::types::RetrievedChunk;
use kbase_core::AppResult;
use kbase_prompt::{build_prompt, BuiltPrompt, PromptDefinition};
use std::collections::HashMap;

/// Context placed in the prompt when retrieval found nothing.
pub const NO_CONTEXT_MARKER: &str = "No relevant documents found for this question.";

/// Format chunks as numbered, titled excerpts.
pub fn build_context(chunks: &[RetrievedChunk], excerpt_chars: usize) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] {}\n{}",
                i + 1,
                chunk.title,
                truncate_chars(&chunk.chunk.text, excerpt_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Render the answer prompt for one question.
pub fn render_answer_prompt(
    definition: &PromptDefinition,
    organization: &str,
    context: &str,
    question: &str,
) -> AppResult<BuiltPrompt> {
    let mut variables = HashMap::new();
    variables.insert("organization".to_string(), organization.to_string());
    variables.insert("context".to_string(), context.to_string());
    variables.insert("question".to_string(), question.to_string());

    build_prompt(definition, variables)
}
