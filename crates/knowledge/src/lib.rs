//! Permission-scoped, multi-tenant knowledge base.
//!
//! Documents are chunked and indexed per tenant in SQLite (FTS5). Questions
//! are answered from the chunks the caller may see, with model fallback,
//! extractive and select-documents degraded modes, citations, a knowledge
//! map and an audit trail.

pub mod access;
pub mod audit;
pub mod chunker;
pub mod config;
pub mod extract;
pub mod hash_id;
pub mod ingest;
pub mod rag;
pub mod retrieval;
pub mod service;
pub mod store;
pub mod tenant;
pub mod text;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use access::{can_view, effective_privileges, require_privilege, PERMISSION_DENIED};
pub use audit::{AuditStatus, Feedback, QueryAudit, QueryAuditRecord, QueryType};
pub use chunker::Chunker;
pub use config::{load_config, save_config, KnowledgeConfig};
pub use extract::{BasicTextExtractor, ContentType, TextExtractor};
pub use ingest::{IngestHandle, Ingestor};
pub use rag::{
    AnswerMode, AnsweredQuestion, Citation, DocumentSelection, KnowledgeGraph, QuestionResponse,
    SelectionReason,
};
pub use retrieval::RetrievalEngine;
pub use service::{Caller, KnowledgeService};
pub use store::{KnowledgeStore, SqliteStore};
pub use tenant::{NewUser, Privilege, Role, Tenant, TenantScope, TenantSettings, User};
pub use types::{
    AccessLevel, CandidateDocument, Chunk, Document, DocumentStatus, DocumentStatusReport,
    NewDocument, RetrievedChunk, UploadedFile,
};
