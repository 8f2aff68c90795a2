//! Persistence for tenants, documents, chunks and audit records.
//!
//! Every document, chunk and audit operation takes a [`TenantScope`]; the
//! backend binds its tenant id into each query, so a caller holding a scope
//! for tenant A has no way to name tenant B's rows.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::access::VisibilityFilter;
use crate::audit::{AuditFeedback, QueryAuditRecord};
use crate::tenant::{Tenant, TenantScope, User};
use crate::types::{Chunk, Document, DocumentStatus};
use kbase_core::AppResult;

/// Tenant and user persistence.
pub trait TenantStore: Send + Sync {
    fn insert_tenant(&self, tenant: &Tenant) -> AppResult<()>;

    fn get_tenant(&self, tenant_id: &str) -> AppResult<Option<Tenant>>;

    /// Save the tenant aggregate (name, roles, settings) in one write.
    ///
    /// Last write wins; counters are not touched.
    fn save_tenant(&self, tenant: &Tenant) -> AppResult<()>;

    /// Insert a user and bump the tenant's user counter atomically.
    ///
    /// Returns `false` without inserting when `max_users` (0 = unlimited)
    /// has been reached.
    fn insert_user(&self, user: &User, max_users: u32) -> AppResult<bool>;

    fn get_user(&self, scope: &TenantScope, user_id: &str) -> AppResult<Option<User>>;

    fn list_users(&self, scope: &TenantScope) -> AppResult<Vec<User>>;
}

/// Document, chunk and lexical search persistence.
pub trait DocumentStore: Send + Sync {
    fn document_id_exists(&self, scope: &TenantScope, document_id: &str) -> AppResult<bool>;

    /// Insert a document and bump the tenant's document counter atomically.
    ///
    /// Returns `false` without inserting when `max_documents` (0 =
    /// unlimited) has been reached.
    fn insert_document(
        &self,
        scope: &TenantScope,
        document: &Document,
        max_documents: u32,
    ) -> AppResult<bool>;

    fn get_document(&self, scope: &TenantScope, document_id: &str) -> AppResult<Option<Document>>;

    fn set_status(
        &self,
        scope: &TenantScope,
        document_id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> AppResult<()>;

    /// Replace the chunk list and searchable content, then mark the
    /// document active, in one transaction.
    fn complete_processing(
        &self,
        scope: &TenantScope,
        document_id: &str,
        content: &str,
        chunks: &[Chunk],
    ) -> AppResult<()>;

    /// Chunks of a document in index order, optionally capped.
    fn chunks(
        &self,
        scope: &TenantScope,
        document_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<Chunk>>;

    /// Active documents matching an FTS5 expression, best first, with
    /// their relevance score (higher is better).
    fn search_documents(
        &self,
        scope: &TenantScope,
        match_expression: &str,
        visibility: &VisibilityFilter,
        limit: usize,
    ) -> AppResult<Vec<(Document, f64)>>;

    /// Most recently updated active documents.
    fn recent_documents(
        &self,
        scope: &TenantScope,
        visibility: &VisibilityFilter,
        limit: usize,
    ) -> AppResult<Vec<Document>>;
}

/// Audit record persistence.
pub trait AuditStore: Send + Sync {
    fn insert_audit(&self, scope: &TenantScope, record: &QueryAuditRecord) -> AppResult<()>;

    fn get_audit(&self, scope: &TenantScope, audit_id: &str) -> AppResult<Option<QueryAuditRecord>>;

    /// Returns `false` when no such record exists in the scope.
    fn save_feedback(
        &self,
        scope: &TenantScope,
        audit_id: &str,
        feedback: &AuditFeedback,
    ) -> AppResult<bool>;

    /// Returns `false` when no such record exists in the scope.
    fn add_clicked_document(
        &self,
        scope: &TenantScope,
        audit_id: &str,
        document_id: &str,
    ) -> AppResult<bool>;
}

/// Everything the knowledge service persists.
pub trait KnowledgeStore: TenantStore + DocumentStore + AuditStore {}

impl<T> KnowledgeStore for T where T: TenantStore + DocumentStore + AuditStore {}
