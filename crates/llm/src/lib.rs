//! Text-generation integration for kbase.
//!
//! A provider-agnostic client trait plus the classification every provider
//! maps its failures onto, so callers can walk a fallback chain of models
//! without knowing any vendor wire format.
//!
//! # Providers
//! - **Hosted**: HTTPS generation API with an API key header (default)
//! - **Ollama**: Local LLM runtime
//! - **Scripted**: Deterministic in-process client for tests
//!
//! # Example
//! ```no_run
//! use kbase_llm::{LlmClient, LlmRequest, providers::HostedClient};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HostedClient::new(Some("key".into()), Duration::from_secs(30));
//! let request = LlmRequest::new("Hello, world!", "gemini-2.0-flash");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use error::LlmError;
pub use factory::create_client;
pub use providers::{HostedClient, OllamaClient, ScriptedClient};
pub use types::{ModelChain, ProviderType};
