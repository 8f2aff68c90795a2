//! Document ingestion.
//!
//! An upload is validated and stored with status `processing`, then text
//! extraction and chunking run on a blocking task. The upload returns
//! before processing finishes; callers poll [`Ingestor::get_document_status`]
//! or await the returned [`IngestHandle`].

use crate::access::{can_view, require_privilege};
use crate::chunker::Chunker;
use crate::extract::TextExtractor;
use crate::hash_id::generate_document_id;
use crate::store::KnowledgeStore;
use crate::tenant::{Privilege, Tenant, TenantScope, User};
use crate::types::{
    AccessLevel, Document, DocumentStatus, DocumentStatusReport, NewDocument, UploadedFile,
};
use chrono::Utc;
use kbase_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Background processing of one document.
#[derive(Debug)]
pub struct IngestHandle {
    pub document_id: String,
    task: JoinHandle<AppResult<DocumentStatus>>,
}

impl IngestHandle {
    /// Wait for processing to finish and return the final status.
    pub async fn wait(self) -> AppResult<DocumentStatus> {
        self.task
            .await
            .map_err(|e| AppError::Processing(format!("Ingestion task failed: {}", e)))?
    }
}

/// Turns uploads into stored, searchable chunks.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn KnowledgeStore>,
    extractor: Arc<dyn TextExtractor>,
    chunker: Chunker,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        extractor: Arc<dyn TextExtractor>,
        chunker: Chunker,
    ) -> Self {
        Self {
            store,
            extractor,
            chunker,
        }
    }

    /// Store a new document and start processing it in the background.
    pub async fn upload_document(
        &self,
        file: UploadedFile,
        metadata: NewDocument,
        user: &User,
        tenant: &Tenant,
    ) -> AppResult<(Document, IngestHandle)> {
        if user.tenant_id != tenant.id {
            return Err(AppError::Validation("Missing tenant context".to_string()));
        }
        require_privilege(user, tenant, Privilege::UploadDocuments)?;

        let title = metadata.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Document title is required".to_string()));
        }
        if file.file_name.trim().is_empty() {
            return Err(AppError::Validation("File name is required".to_string()));
        }
        if file.bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }

        let access_level = metadata
            .access_level
            .unwrap_or(tenant.settings.default_access_level);
        let department = clean_optional(metadata.department).or_else(|| user.department.clone());
        if access_level == AccessLevel::Department && department.is_none() {
            return Err(AppError::Validation(
                "Department documents need a department".to_string(),
            ));
        }

        let scope = tenant.scope();
        let content_hash = sha256_hex(&file.bytes);
        let seed = format!("{}:{}:{}", tenant.id, file.file_name, content_hash);
        let id = generate_document_id(&seed, |candidate| {
            self.store.document_id_exists(&scope, candidate)
        })?;

        let now = Utc::now();
        let document = Document {
            id,
            tenant_id: tenant.id.clone(),
            title,
            description: clean_optional(metadata.description),
            tags: clean_tags(metadata.tags),
            category: clean_optional(metadata.category),
            department,
            access_level,
            uploaded_by: user.id.clone(),
            status: DocumentStatus::Processing,
            error: None,
            file_name: file.file_name.clone(),
            mime_type: file.mime_type.clone(),
            size_bytes: file.bytes.len() as u64,
            content_hash,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
        };

        if !self
            .store
            .insert_document(&scope, &document, tenant.settings.max_documents)?
        {
            return Err(AppError::Validation(
                "Document limit reached for this organization".to_string(),
            ));
        }

        tracing::info!(
            "Accepted document {} ('{}', {} bytes) from user {}",
            document.id,
            document.title,
            document.size_bytes,
            user.id
        );

        let handle = self.spawn_processing(scope, document.id.clone(), file);
        Ok((document, handle))
    }

    /// Replace a document's chunks from a new copy of its file.
    pub async fn reprocess_document(
        &self,
        document_id: &str,
        file: UploadedFile,
        user: &User,
        tenant: &Tenant,
    ) -> AppResult<IngestHandle> {
        if user.tenant_id != tenant.id {
            return Err(AppError::Validation("Missing tenant context".to_string()));
        }
        require_privilege(user, tenant, Privilege::EditDocuments)?;

        let scope = tenant.scope();
        let document = self.visible_document(&scope, document_id, user)?;
        if file.bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }

        self.store
            .set_status(&scope, &document.id, DocumentStatus::Processing, None)?;
        tracing::info!("Reprocessing document {}", document.id);

        Ok(self.spawn_processing(scope, document.id, file))
    }

    /// Current processing state of a document the caller can see.
    pub fn get_document_status(&self, document_id: &str, user: &User) -> AppResult<DocumentStatusReport> {
        let document = self.visible_document(&user.scope(), document_id, user)?;
        Ok(DocumentStatusReport {
            status: document.status,
            error: document.error,
        })
    }

    fn visible_document(&self, scope: &TenantScope, document_id: &str, user: &User) -> AppResult<Document> {
        match self.store.get_document(scope, document_id)? {
            Some(document) if can_view(user, &document) => Ok(document),
            _ => Err(AppError::NotFound("Document not found".to_string())),
        }
    }

    fn spawn_processing(&self, scope: TenantScope, document_id: String, file: UploadedFile) -> IngestHandle {
        let store = self.store.clone();
        let extractor = self.extractor.clone();
        let chunker = self.chunker;
        let id = document_id.clone();

        let task = tokio::task::spawn_blocking(move || {
            process_document(store.as_ref(), extractor.as_ref(), chunker, &scope, &id, &file)
        });

        IngestHandle { document_id, task }
    }
}

/// Extract, chunk and store one document, recording failures on it.
fn process_document(
    store: &dyn KnowledgeStore,
    extractor: &dyn TextExtractor,
    chunker: Chunker,
    scope: &TenantScope,
    document_id: &str,
    file: &UploadedFile,
) -> AppResult<DocumentStatus> {
    let result = extractor.extract(file).and_then(|text| {
        let chunks = chunker.chunk(&text);
        store.complete_processing(scope, document_id, &text, &chunks)?;
        Ok(chunks.len())
    });

    match result {
        Ok(count) => {
            tracing::info!("Document {} is active with {} chunks", document_id, count);
            Ok(DocumentStatus::Active)
        }
        Err(e) => {
            tracing::warn!("Processing failed for document {}: {}", document_id, e);
            record_failure(store, scope, document_id, &e.to_string());
            Ok(DocumentStatus::Failed)
        }
    }
}

/// Mark a document failed, retrying the write once.
fn record_failure(store: &dyn KnowledgeStore, scope: &TenantScope, document_id: &str, message: &str) {
    let write = || store.set_status(scope, document_id, DocumentStatus::Failed, Some(message));

    if let Err(first) = write() {
        tracing::warn!("Retrying failed status for document {}: {}", document_id, first);
        if let Err(e) = write() {
            tracing::error!(
                "Document {} is stuck in processing, failure not recorded: {}",
                document_id,
                e
            );
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BasicTextExtractor;
    use crate::store::{DocumentStore, SqliteStore, TenantStore};
    use crate::tenant::TenantSettings;
    use crate::tests::store::FlakyStore;
    use std::collections::BTreeSet;

    fn setup(settings: TenantSettings) -> (Arc<SqliteStore>, Ingestor, Tenant) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let tenant = Tenant::new("Acme", settings);
        store.insert_tenant(&tenant).unwrap();
        let ingestor = Ingestor::new(
            store.clone(),
            Arc::new(BasicTextExtractor),
            Chunker::new(100, 20),
        );
        (store, ingestor, tenant)
    }

    fn user(tenant: &Tenant, role: &str) -> User {
        User {
            id: format!("{}-user", role),
            tenant_id: tenant.id.clone(),
            name: role.to_string(),
            email: format!("{}@example.com", role),
            department: Some("sales".to_string()),
            org_role: role.to_string(),
            direct_privileges: BTreeSet::new(),
            is_org_admin: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upload_becomes_active() {
        let (store, ingestor, tenant) = setup(TenantSettings::default());
        let employee = user(&tenant, "employee");
        let text = "Travel must be booked two weeks ahead. ".repeat(10);

        let (document, handle) = ingestor
            .upload_document(
                UploadedFile::new("travel.txt", text.into_bytes()),
                NewDocument::titled("Travel policy"),
                &employee,
                &tenant,
            )
            .await
            .unwrap();

        assert_eq!(document.status, DocumentStatus::Processing);
        assert_eq!(document.access_level, AccessLevel::Department);
        assert_eq!(document.department.as_deref(), Some("sales"));
        assert_eq!(document.id.len(), crate::hash_id::ID_LENGTH);

        assert_eq!(handle.wait().await.unwrap(), DocumentStatus::Active);

        let report = ingestor.get_document_status(&document.id, &employee).unwrap();
        assert_eq!(report.status, DocumentStatus::Active);
        assert!(report.error.is_none());

        let stored = store.get_document(&tenant.scope(), &document.id).unwrap().unwrap();
        assert!(stored.chunk_count > 1);
        let loaded = store.get_tenant(&tenant.id).unwrap().unwrap();
        assert_eq!(loaded.document_count, 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_stored() {
        let (_store, ingestor, tenant) = setup(TenantSettings::default());
        let employee = user(&tenant, "employee");

        let (document, handle) = ingestor
            .upload_document(
                UploadedFile::new("scan.pdf", b"%PDF-1.7".to_vec()),
                NewDocument::titled("Scan"),
                &employee,
                &tenant,
            )
            .await
            .unwrap();

        assert_eq!(handle.wait().await.unwrap(), DocumentStatus::Failed);
        let report = ingestor.get_document_status(&document.id, &employee).unwrap();
        assert_eq!(report.status, DocumentStatus::Failed);
        assert!(report.error.unwrap().contains("Unsupported file type"));
    }

    fn flaky_setup(status_failures: usize) -> (Arc<FlakyStore>, Ingestor, Tenant) {
        let store = Arc::new(FlakyStore::new().failing_status_updates(status_failures));
        let tenant = Tenant::new("Acme", TenantSettings::default());
        store.insert_tenant(&tenant).unwrap();
        let ingestor = Ingestor::new(
            store.clone(),
            Arc::new(BasicTextExtractor),
            Chunker::new(100, 20),
        );
        (store, ingestor, tenant)
    }

    async fn upload_scan(ingestor: &Ingestor, tenant: &Tenant, employee: &User) -> (Document, AppResult<DocumentStatus>) {
        let (document, handle) = ingestor
            .upload_document(
                UploadedFile::new("scan.pdf", b"%PDF-1.7".to_vec()),
                NewDocument::titled("Scan"),
                employee,
                tenant,
            )
            .await
            .unwrap();
        (document, handle.wait().await)
    }

    #[tokio::test]
    async fn test_failed_status_write_is_retried() {
        let (store, ingestor, tenant) = flaky_setup(1);
        let employee = user(&tenant, "employee");

        let (document, outcome) = upload_scan(&ingestor, &tenant, &employee).await;

        assert_eq!(outcome.unwrap(), DocumentStatus::Failed);
        let stored = store.get_document(&tenant.scope(), &document.id).unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert!(stored.error.unwrap().contains("Unsupported file type"));
    }

    #[tokio::test]
    async fn test_unwritable_failure_still_reports_failed() {
        let (store, ingestor, tenant) = flaky_setup(5);
        let employee = user(&tenant, "employee");

        let (document, outcome) = upload_scan(&ingestor, &tenant, &employee).await;

        assert_eq!(outcome.unwrap(), DocumentStatus::Failed);
        let stored = store.get_document(&tenant.scope(), &document.id).unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Processing);
    }

    #[tokio::test]
    async fn test_viewer_cannot_upload() {
        let (_store, ingestor, tenant) = setup(TenantSettings::default());
        let viewer = user(&tenant, "viewer");

        let err = ingestor
            .upload_document(
                UploadedFile::new("a.txt", b"hello".to_vec()),
                NewDocument::titled("A"),
                &viewer,
                &tenant,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Permission(_)));
    }

    #[tokio::test]
    async fn test_rejects_blank_title_and_empty_file() {
        let (_store, ingestor, tenant) = setup(TenantSettings::default());
        let employee = user(&tenant, "employee");

        let blank = ingestor
            .upload_document(
                UploadedFile::new("a.txt", b"hello".to_vec()),
                NewDocument::titled("   "),
                &employee,
                &tenant,
            )
            .await;
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let empty = ingestor
            .upload_document(
                UploadedFile::new("a.txt", Vec::new()),
                NewDocument::titled("A"),
                &employee,
                &tenant,
            )
            .await;
        assert!(matches!(empty, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_document_limit() {
        let settings = TenantSettings {
            max_documents: 1,
            ..Default::default()
        };
        let (_store, ingestor, tenant) = setup(settings);
        let employee = user(&tenant, "employee");

        let (_, handle) = ingestor
            .upload_document(
                UploadedFile::new("a.txt", b"first".to_vec()),
                NewDocument::titled("A"),
                &employee,
                &tenant,
            )
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let second = ingestor
            .upload_document(
                UploadedFile::new("b.txt", b"second".to_vec()),
                NewDocument::titled("B"),
                &employee,
                &tenant,
            )
            .await;
        assert!(matches!(second, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_status_hidden_from_other_departments() {
        let (_store, ingestor, tenant) = setup(TenantSettings::default());
        let employee = user(&tenant, "employee");
        let mut outsider = user(&tenant, "viewer");
        outsider.department = Some("legal".to_string());

        let (document, handle) = ingestor
            .upload_document(
                UploadedFile::new("a.txt", b"quarterly numbers".to_vec()),
                NewDocument::titled("Numbers"),
                &employee,
                &tenant,
            )
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let hidden = ingestor.get_document_status(&document.id, &outsider).unwrap_err();
        let missing = ingestor.get_document_status("nope", &outsider).unwrap_err();
        assert!(matches!(hidden, AppError::NotFound(_)));
        assert_eq!(hidden.to_string(), missing.to_string());
    }

    #[tokio::test]
    async fn test_reprocess_replaces_chunks() {
        let (store, ingestor, tenant) = setup(TenantSettings::default());
        let manager = user(&tenant, "manager");
        let long = "Sentence number one is here. ".repeat(20);

        let (document, handle) = ingestor
            .upload_document(
                UploadedFile::new("a.txt", long.into_bytes()),
                NewDocument::titled("Doc"),
                &manager,
                &tenant,
            )
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let handle = ingestor
            .reprocess_document(
                &document.id,
                UploadedFile::new("a.txt", b"short".to_vec()),
                &manager,
                &tenant,
            )
            .await
            .unwrap();
        assert_eq!(handle.wait().await.unwrap(), DocumentStatus::Active);

        let chunks = store.chunks(&tenant.scope(), &document.id, None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
    }

    #[test]
    fn test_clean_tags_dedupes_case_insensitively() {
        let tags = clean_tags(vec![
            " HR ".to_string(),
            "hr".to_string(),
            "".to_string(),
            "Travel".to_string(),
        ]);
        assert_eq!(tags, vec!["HR", "Travel"]);
    }
}
