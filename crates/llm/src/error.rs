//! Provider error classification.
//!
//! Every provider maps its failures onto [`LlmError`] so the answer
//! pipeline can decide between trying the next model, degrading, or
//! surfacing a service error without knowing any wire format.

use kbase_core::AppError;
use thiserror::Error;

/// Classified failure of a text-generation call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// No credential or provider configured.
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// Rate limit or quota exhausted (HTTP 429).
    #[error("rate limited on model {model}: {message}")]
    RateLimited { model: String, message: String },

    /// Model unknown or unavailable (HTTP 404 / NOT_FOUND).
    #[error("model {model} not found: {message}")]
    ModelNotFound { model: String, message: String },

    /// Credential rejected by the provider.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Response body could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Provider answered without any candidate text.
    #[error("provider returned no candidates")]
    EmptyResponse,

    /// Generation stopped for a reason other than completion.
    #[error("unexpected finish reason: {0}")]
    UnexpectedFinish(String),

    /// The call exceeded its deadline.
    #[error("request to model {model} timed out after {secs}s")]
    Timeout { model: String, secs: u64 },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other non-success status.
    #[error("provider error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl LlmError {
    /// Whether the next model in the chain should be tried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::ModelNotFound { .. } | LlmError::Timeout { .. }
        )
    }

    /// Whether the provider rejected the configured credential.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, LlmError::InvalidCredential(_))
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: &str, model: &str) -> Self {
        let message = truncate_body(body);

        if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
            return LlmError::RateLimited {
                model: model.to_string(),
                message,
            };
        }

        if body.contains("API_KEY_INVALID") || body.contains("API key not valid") {
            return LlmError::InvalidCredential(message);
        }

        match status {
            401 | 403 => LlmError::InvalidCredential(message),
            404 => LlmError::ModelNotFound {
                model: model.to_string(),
                message,
            },
            _ if body.contains("NOT_FOUND") => LlmError::ModelNotFound {
                model: model.to_string(),
                message,
            },
            _ => LlmError::Api { status, message },
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.trim().to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{}...", cut.trim_end())
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::NotConfigured(msg) => AppError::Config(msg),
            other => AppError::Llm(other.to_string()),
        }
    }
}
