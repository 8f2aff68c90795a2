//! Feedback command handler.
//!
//! Attaches a rating to a previous answer or records a clicked citation.

use super::context::{open_service, print_json, IdentityArgs};
use clap::{Args, Subcommand};
use kbase_core::{config::AppConfig, AppError, AppResult};
use kbase_knowledge::Feedback;

/// Rate an answer or record a clicked citation
#[derive(Args, Debug)]
pub struct FeedbackCommand {
    #[command(subcommand)]
    pub action: FeedbackAction,
}

#[derive(Subcommand, Debug)]
pub enum FeedbackAction {
    /// Rate an answer (helpful / not-helpful)
    Rate(FeedbackRateCommand),
    /// Record that a cited document was opened
    Click(FeedbackClickCommand),
    /// Show an audit record
    Show(FeedbackShowCommand),
}

impl FeedbackCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            FeedbackAction::Rate(cmd) => cmd.execute(config),
            FeedbackAction::Click(cmd) => cmd.execute(config),
            FeedbackAction::Show(cmd) => cmd.execute(config),
        }
    }
}

/// Rate an answer
#[derive(Args, Debug)]
pub struct FeedbackRateCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Audit id printed with the answer
    pub audit_id: String,

    /// helpful or not-helpful
    pub verdict: String,

    /// Rating from 1 to 5
    #[arg(long)]
    pub rating: Option<u8>,

    /// Free-text comment
    #[arg(long)]
    pub comment: Option<String>,
}

impl FeedbackRateCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let feedback = Feedback::parse(&self.verdict).ok_or_else(|| {
            AppError::Validation(format!(
                "Unknown feedback '{}' (expected helpful or not-helpful)",
                self.verdict
            ))
        })?;

        let service = open_service(config)?;
        service.attach_feedback(
            &self.identity.caller(),
            &self.audit_id,
            feedback,
            self.rating,
            self.comment.clone(),
        )?;

        println!("Feedback recorded");
        Ok(())
    }
}

/// Record a clicked citation
#[derive(Args, Debug)]
pub struct FeedbackClickCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Audit id printed with the answer
    pub audit_id: String,

    /// Cited document id
    pub document_id: String,
}

impl FeedbackClickCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = open_service(config)?;
        service.mark_clicked(&self.identity.caller(), &self.audit_id, &self.document_id)?;
        println!("Click recorded");
        Ok(())
    }
}

/// Show an audit record
#[derive(Args, Debug)]
pub struct FeedbackShowCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Audit id
    pub audit_id: String,
}

impl FeedbackShowCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = open_service(config)?;
        let record = service.get_audit(&self.identity.caller(), &self.audit_id)?;
        print_json(&record)
    }
}
