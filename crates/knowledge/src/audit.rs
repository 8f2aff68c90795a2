//! Query audit trail.
//!
//! One record per question, written when the answer (or failure) is known.
//! Records are append-only apart from feedback and click tracking. Audit
//! writes must never fail the caller's primary response; use
//! [`QueryAudit::log_best_effort`] on answer paths.

use crate::access::is_admin_equivalent;
use crate::store::KnowledgeStore;
use crate::tenant::{TenantScope, User};
use crate::types::RetrievedChunk;
use chrono::{DateTime, Utc};
use kbase_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Question,
    SelectedDocuments,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::SelectedDocuments => "selected_documents",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "question" => Some(Self::Question),
            "selected_documents" => Some(Self::SelectedDocuments),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// A model produced the answer.
    Success,
    /// Extractive, not-found or select-documents response.
    Degraded,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Degraded => "degraded",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "degraded" => Some(Self::Degraded),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Helpful,
    NotHelpful,
}

impl Feedback {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "helpful" | "up" | "yes" => Some(Self::Helpful),
            "not_helpful" | "down" | "no" => Some(Self::NotHelpful),
            _ => None,
        }
    }
}

/// A chunk that grounded an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitedChunk {
    pub document_id: String,
    pub chunk_index: u32,
    pub title: String,
}

impl From<&RetrievedChunk> for CitedChunk {
    fn from(chunk: &RetrievedChunk) -> Self {
        Self {
            document_id: chunk.document_id.clone(),
            chunk_index: chunk.chunk.chunk_index,
            title: chunk.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFeedback {
    pub feedback: Feedback,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Snapshot of one query, including who asked it at the time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAuditRecord {
    pub id: String,
    pub tenant_id: String,
    pub query: String,
    pub query_type: QueryType,
    pub user_id: String,
    pub user_department_at_time: Option<String>,
    pub user_role_at_time: String,
    pub cited_chunks: Vec<CitedChunk>,
    pub response_time_ms: u64,
    pub ai_model_used: Option<String>,
    /// Answer path taken (generated, extractive, not_found, select_documents).
    pub answer_mode: Option<String>,
    pub status: AuditStatus,
    pub error: Option<String>,
    pub feedback: Option<AuditFeedback>,
    pub clicked_documents: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl QueryAuditRecord {
    pub fn new(user: &User, query: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: user.tenant_id.clone(),
            query: query.into(),
            query_type,
            user_id: user.id.clone(),
            user_department_at_time: user.department.clone(),
            user_role_at_time: user.org_role.clone(),
            cited_chunks: Vec::new(),
            response_time_ms: 0,
            ai_model_used: None,
            answer_mode: None,
            status: AuditStatus::Success,
            error: None,
            feedback: None,
            clicked_documents: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_cited_chunks(mut self, chunks: &[RetrievedChunk]) -> Self {
        self.cited_chunks = chunks.iter().map(CitedChunk::from).collect();
        self
    }

    pub fn with_outcome(
        mut self,
        status: AuditStatus,
        answer_mode: &str,
        model: Option<&str>,
    ) -> Self {
        self.status = status;
        self.answer_mode = Some(answer_mode.to_string());
        self.ai_model_used = model.map(str::to_string);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.status = AuditStatus::Error;
        self.error = Some(error.into());
        self
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }
}

/// Writes and patches audit records.
#[derive(Clone)]
pub struct QueryAudit {
    store: Arc<dyn KnowledgeStore>,
}

impl QueryAudit {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Persist a record and return its id.
    pub fn log(&self, scope: &TenantScope, record: &QueryAuditRecord) -> AppResult<String> {
        self.store.insert_audit(scope, record)?;
        tracing::debug!("Logged query audit {} ({})", record.id, record.status.as_str());
        Ok(record.id.clone())
    }

    /// Persist a record, logging and swallowing any failure.
    pub fn log_best_effort(&self, scope: &TenantScope, record: &QueryAuditRecord) -> Option<String> {
        match self.log(scope, record) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Failed to write query audit record: {}", e);
                None
            }
        }
    }

    pub fn get(&self, user: &User, audit_id: &str) -> AppResult<QueryAuditRecord> {
        let record = self
            .store
            .get_audit(&user.scope(), audit_id)?
            .ok_or_else(|| AppError::NotFound("Audit record not found".to_string()))?;

        // Other users' records are reported as missing.
        if record.user_id != user.id && !is_admin_equivalent(user) {
            return Err(AppError::NotFound("Audit record not found".to_string()));
        }

        Ok(record)
    }

    /// Attach user feedback to a previous answer.
    pub fn attach_feedback(
        &self,
        user: &User,
        audit_id: &str,
        feedback: Feedback,
        rating: Option<u8>,
        comment: Option<String>,
    ) -> AppResult<()> {
        if let Some(r) = rating {
            if !(1..=5).contains(&r) {
                return Err(AppError::Validation(format!(
                    "Rating must be between 1 and 5, got {}",
                    r
                )));
            }
        }

        let record = self.get(user, audit_id)?;

        let comment = comment
            .map(|c| c.trim().chars().take(MAX_COMMENT_CHARS).collect::<String>())
            .filter(|c| !c.is_empty());

        let feedback = AuditFeedback {
            feedback,
            rating,
            comment,
            submitted_at: Utc::now(),
        };

        if !self.store.save_feedback(&user.scope(), &record.id, &feedback)? {
            return Err(AppError::NotFound("Audit record not found".to_string()));
        }

        tracing::info!("Recorded feedback on audit {}", record.id);
        Ok(())
    }

    /// Record that the user opened a cited document.
    pub fn mark_clicked(&self, user: &User, audit_id: &str, document_id: &str) -> AppResult<()> {
        let record = self.get(user, audit_id)?;

        if !record.cited_chunks.iter().any(|c| c.document_id == document_id) {
            return Err(AppError::Validation(
                "Document was not cited in this answer".to_string(),
            ));
        }

        if !self
            .store
            .add_clicked_document(&user.scope(), &record.id, document_id)?
        {
            return Err(AppError::NotFound("Audit record not found".to_string()));
        }

        Ok(())
    }
}
