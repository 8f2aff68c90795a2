//! Store wrapper that records audit writes and injects write failures.

use crate::access::VisibilityFilter;
use crate::audit::{AuditFeedback, QueryAuditRecord};
use crate::store::{AuditStore, DocumentStore, SqliteStore, TenantStore};
use crate::tenant::{Tenant, TenantScope, User};
use crate::types::{Chunk, Document, DocumentStatus};
use kbase_core::{AppError, AppResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct FlakyStore {
    inner: SqliteStore,
    fail_audits: bool,
    status_failures: AtomicUsize,
    audits: Mutex<Vec<QueryAuditRecord>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_audits: false,
            status_failures: AtomicUsize::new(0),
            audits: Mutex::new(Vec::new()),
        }
    }

    /// Every audit insert fails after being recorded.
    pub fn failing_audits(mut self) -> Self {
        self.fail_audits = true;
        self
    }

    /// The next `count` status updates fail.
    pub fn failing_status_updates(self, count: usize) -> Self {
        self.status_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Audit records the service tried to write, successful or not.
    pub fn attempted_audits(&self) -> Vec<QueryAuditRecord> {
        self.audits.lock().unwrap().clone()
    }
}

impl TenantStore for FlakyStore {
    fn insert_tenant(&self, tenant: &Tenant) -> AppResult<()> {
        self.inner.insert_tenant(tenant)
    }

    fn get_tenant(&self, tenant_id: &str) -> AppResult<Option<Tenant>> {
        self.inner.get_tenant(tenant_id)
    }

    fn save_tenant(&self, tenant: &Tenant) -> AppResult<()> {
        self.inner.save_tenant(tenant)
    }

    fn insert_user(&self, user: &User, max_users: u32) -> AppResult<bool> {
        self.inner.insert_user(user, max_users)
    }

    fn get_user(&self, scope: &TenantScope, user_id: &str) -> AppResult<Option<User>> {
        self.inner.get_user(scope, user_id)
    }

    fn list_users(&self, scope: &TenantScope) -> AppResult<Vec<User>> {
        self.inner.list_users(scope)
    }
}

impl DocumentStore for FlakyStore {
    fn document_id_exists(&self, scope: &TenantScope, document_id: &str) -> AppResult<bool> {
        self.inner.document_id_exists(scope, document_id)
    }

    fn insert_document(&self, scope: &TenantScope, document: &Document, max_documents: u32) -> AppResult<bool> {
        self.inner.insert_document(scope, document, max_documents)
    }

    fn get_document(&self, scope: &TenantScope, document_id: &str) -> AppResult<Option<Document>> {
        self.inner.get_document(scope, document_id)
    }

    fn set_status(
        &self,
        scope: &TenantScope,
        document_id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> AppResult<()> {
        let pending = self
            .status_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(AppError::Storage("database is locked".to_string()));
        }
        self.inner.set_status(scope, document_id, status, error)
    }

    fn complete_processing(
        &self,
        scope: &TenantScope,
        document_id: &str,
        content: &str,
        chunks: &[Chunk],
    ) -> AppResult<()> {
        self.inner.complete_processing(scope, document_id, content, chunks)
    }

    fn chunks(&self, scope: &TenantScope, document_id: &str, limit: Option<usize>) -> AppResult<Vec<Chunk>> {
        self.inner.chunks(scope, document_id, limit)
    }

    fn search_documents(
        &self,
        scope: &TenantScope,
        match_expression: &str,
        visibility: &VisibilityFilter,
        limit: usize,
    ) -> AppResult<Vec<(Document, f64)>> {
        self.inner.search_documents(scope, match_expression, visibility, limit)
    }

    fn recent_documents(
        &self,
        scope: &TenantScope,
        visibility: &VisibilityFilter,
        limit: usize,
    ) -> AppResult<Vec<Document>> {
        self.inner.recent_documents(scope, visibility, limit)
    }
}

impl AuditStore for FlakyStore {
    fn insert_audit(&self, scope: &TenantScope, record: &QueryAuditRecord) -> AppResult<()> {
        self.audits.lock().unwrap().push(record.clone());
        if self.fail_audits {
            return Err(AppError::Storage("disk full".to_string()));
        }
        self.inner.insert_audit(scope, record)
    }

    fn get_audit(&self, scope: &TenantScope, audit_id: &str) -> AppResult<Option<QueryAuditRecord>> {
        self.inner.get_audit(scope, audit_id)
    }

    fn save_feedback(&self, scope: &TenantScope, audit_id: &str, feedback: &AuditFeedback) -> AppResult<bool> {
        self.inner.save_feedback(scope, audit_id, feedback)
    }

    fn add_clicked_document(&self, scope: &TenantScope, audit_id: &str, document_id: &str) -> AppResult<bool> {
        self.inner.add_clicked_document(scope, audit_id, document_id)
    }
}
