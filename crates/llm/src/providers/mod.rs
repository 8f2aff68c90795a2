//! Provider implementations.

pub mod hosted;
pub mod ollama;
pub mod scripted;

pub use hosted::HostedClient;
pub use ollama::OllamaClient;
pub use scripted::ScriptedClient;
