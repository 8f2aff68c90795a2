//! Error types for kbase.
//!
//! A single error enum covers every category the knowledge service can
//! surface: client mistakes (validation, missing resources, denied access),
//! provider failures, ingestion failures and infrastructure errors.

use thiserror::Error;

/// Unified error type for kbase.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input rejected before any retrieval work
    /// (empty question, missing tenant context, bad limits).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A document, tenant, user, role or audit record does not exist
    /// (or is not visible to the caller).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller lacks a privilege or visibility. Messages never name the
    /// denied resource.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fatal model provider errors surfaced to the caller
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text extraction or chunking failure during ingestion
    #[error("Processing error: {0}")]
    Processing(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Knowledge base and RAG errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// HTTP-equivalent status code for the excluded transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Permission(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Llm(_) => 502,
            _ => 500,
        }
    }

    /// Whether the error was caused by the caller rather than the service.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
