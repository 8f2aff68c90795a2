//! Prompt system for kbase.
//!
//! This crate provides structured prompt management with:
//! - YAML prompt definitions (built-in, overridable per workspace)
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{list_prompts, load_prompt, GRAPH_PLAN_PROMPT, RAG_ANSWER_PROMPT};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
