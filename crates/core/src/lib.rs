//! kbase core library
//!
//! This crate provides the foundational utilities shared by every kbase crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, LlmSettings};
pub use error::{AppError, AppResult};
