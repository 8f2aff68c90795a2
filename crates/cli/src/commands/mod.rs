//! Command handlers for the kbase CLI.
//!
//! Each command opens the service from the workspace configuration and
//! acts as the identity given by `--tenant` / `--user`.

pub mod ask;
pub mod context;
pub mod feedback;
pub mod tenant;
pub mod upload;
pub mod user;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use feedback::FeedbackCommand;
pub use tenant::TenantCommand;
pub use upload::{StatusCommand, UploadCommand};
pub use user::{PrivilegesCommand, UserCommand};
