//! SQLite implementation of the knowledge store.
//!
//! Documents are searched through an FTS5 table whose rowid mirrors the
//! `documents` rowid. Title and tags carry more weight than description
//! and body text in the BM25 ranking.

use super::{AuditStore, DocumentStore, TenantStore};
use crate::access::VisibilityFilter;
use crate::audit::{AuditFeedback, AuditStatus, QueryAuditRecord, QueryType};
use crate::tenant::{Tenant, TenantScope, User};
use crate::types::{AccessLevel, Chunk, Document, DocumentStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use kbase_core::{AppError, AppResult};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    roles TEXT NOT NULL,
    settings TEXT NOT NULL,
    document_count INTEGER NOT NULL DEFAULT 0,
    user_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id),
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    department TEXT,
    org_role TEXT NOT NULL,
    direct_privileges TEXT NOT NULL,
    is_org_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE (tenant_id, email)
);

CREATE TABLE IF NOT EXISTS documents (
    tenant_id TEXT NOT NULL REFERENCES tenants(id),
    id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    tags TEXT NOT NULL,
    category TEXT,
    department TEXT,
    access_level TEXT NOT NULL,
    uploaded_by TEXT NOT NULL,
    status TEXT NOT NULL,
    error TEXT,
    file_name TEXT NOT NULL,
    mime_type TEXT,
    size_bytes INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(tenant_id, status, updated_at);

CREATE TABLE IF NOT EXISTS chunks (
    tenant_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    start_page INTEGER,
    end_page INTEGER,
    PRIMARY KEY (tenant_id, document_id, chunk_index),
    FOREIGN KEY (tenant_id, document_id) REFERENCES documents(tenant_id, id)
);

CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    title,
    tags,
    description,
    content
);

CREATE TABLE IF NOT EXISTS query_audit (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id),
    query TEXT NOT NULL,
    query_type TEXT NOT NULL,
    user_id TEXT NOT NULL,
    user_department TEXT,
    user_role TEXT NOT NULL,
    cited_chunks TEXT NOT NULL,
    response_time_ms INTEGER NOT NULL,
    ai_model_used TEXT,
    answer_mode TEXT,
    status TEXT NOT NULL,
    error TEXT,
    feedback TEXT,
    clicked_documents TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_query_audit_tenant ON query_audit(tenant_id, created_at);
"#;

const DOCUMENT_COLUMNS: &str = "d.id, d.tenant_id, d.title, d.description, d.tags, d.category, \
     d.department, d.access_level, d.uploaded_by, d.status, d.error, d.file_name, d.mime_type, \
     d.size_bytes, d.content_hash, d.chunk_count, d.created_at, d.updated_at";

/// Number of columns in `DOCUMENT_COLUMNS`.
const DOCUMENT_COLUMN_COUNT: usize = 18;

const VISIBILITY_CLAUSE: &str = "(:unrestricted = 1 \
     OR d.access_level = 'public' \
     OR (d.access_level = 'department' AND d.department IS NOT NULL AND d.department = :department) \
     OR (d.access_level = 'private' AND d.uploaded_by = :user_id))";

const USER_COLUMNS: &str =
    "id, tenant_id, name, email, department, org_role, direct_privileges, is_org_admin, created_at";

const AUDIT_COLUMNS: &str = "id, tenant_id, query, query_type, user_id, user_department, user_role, \
     cited_chunks, response_time_ms, ai_model_used, answer_mode, status, error, feedback, \
     clicked_documents, created_at";

/// SQLite-backed [`KnowledgeStore`](super::KnowledgeStore).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open SQLite database: {}", e)))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AppError::Storage(format!("Failed to set journal_mode: {}", e)))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Storage(format!("Failed to set busy_timeout: {}", e)))?;

        let store = Self::init(conn)?;
        tracing::debug!("Opened knowledge store at {:?}", db_path);
        Ok(store)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open in-memory database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| AppError::Storage(format!("Failed to enable foreign keys: {}", e)))?;

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| AppError::Storage(format!("Failed to read schema version: {}", e)))?;

        if version == 0 {
            conn.execute_batch(SCHEMA)
                .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .map_err(|e| AppError::Storage(format!("Failed to set schema version: {}", e)))?;
        } else if version != SCHEMA_VERSION {
            return Err(AppError::Storage(format!(
                "Unsupported schema version {}, expected {}",
                version, SCHEMA_VERSION
            )));
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Storage("Database connection lock poisoned".to_string()))
    }
}

fn db_error(context: &str) -> impl Fn(rusqlite::Error) -> AppError + '_ {
    move |e| AppError::Storage(format!("{}: {}", context, e))
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::<dyn std::error::Error + Send + Sync>::from(message),
    )
}

fn parse_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, format!("invalid timestamp '{}': {}", raw, e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(index, e.to_string()))
}

fn parse_optional_json<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    index: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|r| serde_json::from_str(&r).map_err(|e| conversion_error(index, e.to_string())))
        .transpose()
}

fn to_json<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Serialization(format!("Failed to serialize column: {}", e)))
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let access_level: String = row.get(7)?;
    let status: String = row.get(9)?;

    Ok(Document {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        tags: parse_json(row, 4)?,
        category: row.get(5)?,
        department: row.get(6)?,
        access_level: AccessLevel::parse(&access_level)
            .ok_or_else(|| conversion_error(7, format!("unknown access level '{}'", access_level)))?,
        uploaded_by: row.get(8)?,
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| conversion_error(9, format!("unknown status '{}'", status)))?,
        error: row.get(10)?,
        file_name: row.get(11)?,
        mime_type: row.get(12)?,
        size_bytes: row.get::<_, i64>(13)?.max(0) as u64,
        content_hash: row.get(14)?,
        chunk_count: row.get::<_, i64>(15)?.max(0) as u32,
        created_at: parse_timestamp(row, 16)?,
        updated_at: parse_timestamp(row, 17)?,
    })
}

fn tenant_from_row(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        roles: parse_json(row, 2)?,
        settings: parse_json(row, 3)?,
        document_count: row.get::<_, i64>(4)?.max(0) as u64,
        user_count: row.get::<_, i64>(5)?.max(0) as u64,
        created_at: parse_timestamp(row, 6)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        department: row.get(4)?,
        org_role: row.get(5)?,
        direct_privileges: parse_json(row, 6)?,
        is_org_admin: row.get(7)?,
        created_at: parse_timestamp(row, 8)?,
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<QueryAuditRecord> {
    let query_type: String = row.get(3)?;
    let status: String = row.get(11)?;

    Ok(QueryAuditRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        query: row.get(2)?,
        query_type: QueryType::parse(&query_type)
            .ok_or_else(|| conversion_error(3, format!("unknown query type '{}'", query_type)))?,
        user_id: row.get(4)?,
        user_department_at_time: row.get(5)?,
        user_role_at_time: row.get(6)?,
        cited_chunks: parse_json(row, 7)?,
        response_time_ms: row.get::<_, i64>(8)?.max(0) as u64,
        ai_model_used: row.get(9)?,
        answer_mode: row.get(10)?,
        status: AuditStatus::parse(&status)
            .ok_or_else(|| conversion_error(11, format!("unknown audit status '{}'", status)))?,
        error: row.get(12)?,
        feedback: parse_optional_json(row, 13)?,
        clicked_documents: parse_json(row, 14)?,
        created_at: parse_timestamp(row, 15)?,
    })
}

/// Named parameter values for `VISIBILITY_CLAUSE`.
fn visibility_values(visibility: &VisibilityFilter) -> (i64, Option<String>, String) {
    match visibility {
        VisibilityFilter::Unrestricted => (1, None, String::new()),
        VisibilityFilter::Restricted {
            user_id,
            department,
        } => (0, department.clone(), user_id.clone()),
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl TenantStore for SqliteStore {
    fn insert_tenant(&self, tenant: &Tenant) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tenants (id, name, roles, settings, document_count, user_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                tenant.id,
                tenant.name,
                to_json(&tenant.roles)?,
                to_json(&tenant.settings)?,
                tenant.document_count as i64,
                tenant.user_count as i64,
                timestamp(&tenant.created_at),
            ],
        )
        .map_err(db_error("Failed to insert tenant"))?;

        Ok(())
    }

    fn get_tenant(&self, tenant_id: &str) -> AppResult<Option<Tenant>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, roles, settings, document_count, user_count, created_at
             FROM tenants WHERE id = ?1",
            params![tenant_id],
            tenant_from_row,
        )
        .optional()
        .map_err(db_error("Failed to load tenant"))
    }

    fn save_tenant(&self, tenant: &Tenant) -> AppResult<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE tenants SET name = ?2, roles = ?3, settings = ?4, updated_at = ?5 WHERE id = ?1",
                params![
                    tenant.id,
                    tenant.name,
                    to_json(&tenant.roles)?,
                    to_json(&tenant.settings)?,
                    timestamp(&Utc::now()),
                ],
            )
            .map_err(db_error("Failed to save tenant"))?;

        if changed == 0 {
            return Err(AppError::NotFound("Tenant not found".to_string()));
        }
        Ok(())
    }

    fn insert_user(&self, user: &User, max_users: u32) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_error("Failed to begin transaction"))?;

        let exists: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM tenants WHERE id = ?1",
                params![user.tenant_id],
                |row| row.get(0),
            )
            .map_err(db_error("Failed to check tenant"))?;
        if exists == 0 {
            return Err(AppError::NotFound("Tenant not found".to_string()));
        }

        let reserved = tx
            .execute(
                "UPDATE tenants SET user_count = user_count + 1
                 WHERE id = ?1 AND (?2 = 0 OR user_count < ?2)",
                params![user.tenant_id, max_users as i64],
            )
            .map_err(db_error("Failed to update user count"))?;
        if reserved == 0 {
            return Ok(false);
        }

        tx.execute(
            &format!(
                "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                USER_COLUMNS
            ),
            params![
                user.id,
                user.tenant_id,
                user.name,
                user.email,
                user.department,
                user.org_role,
                to_json(&user.direct_privileges)?,
                user.is_org_admin,
                timestamp(&user.created_at),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                AppError::Validation("A user with this email already exists".to_string())
            } else {
                AppError::Storage(format!("Failed to insert user: {}", e))
            }
        })?;

        tx.commit().map_err(db_error("Failed to commit user"))?;
        Ok(true)
    }

    fn get_user(&self, scope: &TenantScope, user_id: &str) -> AppResult<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM users WHERE tenant_id = ?1 AND id = ?2",
                USER_COLUMNS
            ),
            params![scope.tenant_id(), user_id],
            user_from_row,
        )
        .optional()
        .map_err(db_error("Failed to load user"))
    }

    fn list_users(&self, scope: &TenantScope) -> AppResult<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM users WHERE tenant_id = ?1 ORDER BY created_at, email",
                USER_COLUMNS
            ))
            .map_err(db_error("Failed to prepare user listing"))?;

        let users = stmt
            .query_map(params![scope.tenant_id()], user_from_row)
            .map_err(db_error("Failed to list users"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_error("Failed to read user row"))?;

        Ok(users)
    }
}

impl DocumentStore for SqliteStore {
    fn document_id_exists(&self, scope: &TenantScope, document_id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE tenant_id = ?1 AND id = ?2",
                params![scope.tenant_id(), document_id],
                |row| row.get(0),
            )
            .map_err(db_error("Failed to check document id"))?;
        Ok(count > 0)
    }

    fn insert_document(
        &self,
        scope: &TenantScope,
        document: &Document,
        max_documents: u32,
    ) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_error("Failed to begin transaction"))?;

        let exists: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM tenants WHERE id = ?1",
                params![scope.tenant_id()],
                |row| row.get(0),
            )
            .map_err(db_error("Failed to check tenant"))?;
        if exists == 0 {
            return Err(AppError::NotFound("Tenant not found".to_string()));
        }

        let reserved = tx
            .execute(
                "UPDATE tenants SET document_count = document_count + 1
                 WHERE id = ?1 AND (?2 = 0 OR document_count < ?2)",
                params![scope.tenant_id(), max_documents as i64],
            )
            .map_err(db_error("Failed to update document count"))?;
        if reserved == 0 {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO documents (tenant_id, id, title, description, tags, category, department,
                access_level, uploaded_by, status, error, file_name, mime_type, size_bytes,
                content_hash, chunk_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                scope.tenant_id(),
                document.id,
                document.title,
                document.description,
                to_json(&document.tags)?,
                document.category,
                document.department,
                document.access_level.as_str(),
                document.uploaded_by,
                document.status.as_str(),
                document.error,
                document.file_name,
                document.mime_type,
                document.size_bytes as i64,
                document.content_hash,
                document.chunk_count as i64,
                timestamp(&document.created_at),
                timestamp(&document.updated_at),
            ],
        )
        .map_err(db_error("Failed to insert document"))?;

        let rowid = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO documents_fts (rowid, title, tags, description, content)
             VALUES (?1, ?2, ?3, ?4, '')",
            params![
                rowid,
                document.title,
                document.tags.join(" "),
                document.description.as_deref().unwrap_or(""),
            ],
        )
        .map_err(db_error("Failed to index document"))?;

        tx.commit().map_err(db_error("Failed to commit document"))?;
        Ok(true)
    }

    fn get_document(&self, scope: &TenantScope, document_id: &str) -> AppResult<Option<Document>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM documents d WHERE d.tenant_id = ?1 AND d.id = ?2",
                DOCUMENT_COLUMNS
            ),
            params![scope.tenant_id(), document_id],
            document_from_row,
        )
        .optional()
        .map_err(db_error("Failed to load document"))
    }

    fn set_status(
        &self,
        scope: &TenantScope,
        document_id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> AppResult<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE documents SET status = ?3, error = ?4, updated_at = ?5
                 WHERE tenant_id = ?1 AND id = ?2",
                params![
                    scope.tenant_id(),
                    document_id,
                    status.as_str(),
                    error,
                    timestamp(&Utc::now()),
                ],
            )
            .map_err(db_error("Failed to update document status"))?;

        if changed == 0 {
            return Err(AppError::NotFound("Document not found".to_string()));
        }
        Ok(())
    }

    fn complete_processing(
        &self,
        scope: &TenantScope,
        document_id: &str,
        content: &str,
        chunks: &[Chunk],
    ) -> AppResult<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_error("Failed to begin transaction"))?;

        let changed = tx
            .execute(
                "UPDATE documents SET status = 'active', error = NULL, chunk_count = ?3, updated_at = ?4
                 WHERE tenant_id = ?1 AND id = ?2",
                params![
                    scope.tenant_id(),
                    document_id,
                    chunks.len() as i64,
                    timestamp(&Utc::now()),
                ],
            )
            .map_err(db_error("Failed to activate document"))?;
        if changed == 0 {
            return Err(AppError::NotFound("Document not found".to_string()));
        }

        tx.execute(
            "DELETE FROM chunks WHERE tenant_id = ?1 AND document_id = ?2",
            params![scope.tenant_id(), document_id],
        )
        .map_err(db_error("Failed to clear chunks"))?;

        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO chunks (tenant_id, document_id, chunk_index, text, start_page, end_page)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(db_error("Failed to prepare chunk insert"))?;

            for chunk in chunks {
                insert
                    .execute(params![
                        scope.tenant_id(),
                        document_id,
                        chunk.chunk_index as i64,
                        chunk.text,
                        chunk.start_page.map(i64::from),
                        chunk.end_page.map(i64::from),
                    ])
                    .map_err(db_error("Failed to insert chunk"))?;
            }
        }

        tx.execute(
            "UPDATE documents_fts SET content = ?3
             WHERE rowid = (SELECT rowid FROM documents WHERE tenant_id = ?1 AND id = ?2)",
            params![scope.tenant_id(), document_id, content],
        )
        .map_err(db_error("Failed to index document content"))?;

        tx.commit()
            .map_err(db_error("Failed to commit processed document"))?;
        Ok(())
    }

    fn chunks(
        &self,
        scope: &TenantScope,
        document_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<Chunk>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT text, chunk_index, start_page, end_page FROM chunks
                 WHERE tenant_id = ?1 AND document_id = ?2
                 ORDER BY chunk_index
                 LIMIT ?3",
            )
            .map_err(db_error("Failed to prepare chunk query"))?;

        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let chunks = stmt
            .query_map(params![scope.tenant_id(), document_id, limit], |row| {
                Ok(Chunk {
                    text: row.get(0)?,
                    chunk_index: row.get::<_, i64>(1)? as u32,
                    start_page: row.get::<_, Option<i64>>(2)?.map(|p| p as u32),
                    end_page: row.get::<_, Option<i64>>(3)?.map(|p| p as u32),
                })
            })
            .map_err(db_error("Failed to query chunks"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_error("Failed to read chunk row"))?;

        Ok(chunks)
    }

    fn search_documents(
        &self,
        scope: &TenantScope,
        match_expression: &str,
        visibility: &VisibilityFilter,
        limit: usize,
    ) -> AppResult<Vec<(Document, f64)>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {columns}, -bm25(documents_fts, 10.0, 8.0, 3.0, 1.0) AS score
             FROM documents_fts
             JOIN documents d ON d.rowid = documents_fts.rowid
             WHERE documents_fts MATCH :query
               AND d.tenant_id = :tenant_id
               AND d.status = 'active'
               AND {visibility}
             ORDER BY score DESC, d.updated_at DESC
             LIMIT :limit",
            columns = DOCUMENT_COLUMNS,
            visibility = VISIBILITY_CLAUSE,
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(db_error("Failed to prepare search"))?;

        let (unrestricted, department, user_id) = visibility_values(visibility);
        let results = stmt
            .query_map(
                named_params! {
                    ":query": match_expression,
                    ":tenant_id": scope.tenant_id(),
                    ":unrestricted": unrestricted,
                    ":department": department,
                    ":user_id": user_id,
                    ":limit": limit as i64,
                },
                |row| {
                    let document = document_from_row(row)?;
                    let score: f64 = row.get(DOCUMENT_COLUMN_COUNT)?;
                    Ok((document, score))
                },
            )
            .map_err(db_error("Failed to search documents"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_error("Failed to read search row"))?;

        tracing::debug!(
            "Search '{}' matched {} documents (limit {})",
            match_expression,
            results.len(),
            limit
        );

        Ok(results)
    }

    fn recent_documents(
        &self,
        scope: &TenantScope,
        visibility: &VisibilityFilter,
        limit: usize,
    ) -> AppResult<Vec<Document>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {columns} FROM documents d
             WHERE d.tenant_id = :tenant_id
               AND d.status = 'active'
               AND {visibility}
             ORDER BY d.updated_at DESC
             LIMIT :limit",
            columns = DOCUMENT_COLUMNS,
            visibility = VISIBILITY_CLAUSE,
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(db_error("Failed to prepare recent documents query"))?;

        let (unrestricted, department, user_id) = visibility_values(visibility);
        let documents = stmt
            .query_map(
                named_params! {
                    ":tenant_id": scope.tenant_id(),
                    ":unrestricted": unrestricted,
                    ":department": department,
                    ":user_id": user_id,
                    ":limit": limit as i64,
                },
                document_from_row,
            )
            .map_err(db_error("Failed to query recent documents"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_error("Failed to read document row"))?;

        Ok(documents)
    }
}

impl AuditStore for SqliteStore {
    fn insert_audit(&self, scope: &TenantScope, record: &QueryAuditRecord) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO query_audit ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                AUDIT_COLUMNS
            ),
            params![
                record.id,
                scope.tenant_id(),
                record.query,
                record.query_type.as_str(),
                record.user_id,
                record.user_department_at_time,
                record.user_role_at_time,
                to_json(&record.cited_chunks)?,
                record.response_time_ms as i64,
                record.ai_model_used,
                record.answer_mode,
                record.status.as_str(),
                record.error,
                record.feedback.as_ref().map(to_json).transpose()?,
                to_json(&record.clicked_documents)?,
                timestamp(&record.created_at),
            ],
        )
        .map_err(db_error("Failed to insert audit record"))?;

        Ok(())
    }

    fn get_audit(&self, scope: &TenantScope, audit_id: &str) -> AppResult<Option<QueryAuditRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM query_audit WHERE tenant_id = ?1 AND id = ?2",
                AUDIT_COLUMNS
            ),
            params![scope.tenant_id(), audit_id],
            audit_from_row,
        )
        .optional()
        .map_err(db_error("Failed to load audit record"))
    }

    fn save_feedback(
        &self,
        scope: &TenantScope,
        audit_id: &str,
        feedback: &AuditFeedback,
    ) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE query_audit SET feedback = ?3 WHERE tenant_id = ?1 AND id = ?2",
                params![scope.tenant_id(), audit_id, to_json(feedback)?],
            )
            .map_err(db_error("Failed to save feedback"))?;
        Ok(changed > 0)
    }

    fn add_clicked_document(
        &self,
        scope: &TenantScope,
        audit_id: &str,
        document_id: &str,
    ) -> AppResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(db_error("Failed to begin transaction"))?;

        let current: Option<String> = tx
            .query_row(
                "SELECT clicked_documents FROM query_audit WHERE tenant_id = ?1 AND id = ?2",
                params![scope.tenant_id(), audit_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error("Failed to load clicked documents"))?;

        let Some(current) = current else {
            return Ok(false);
        };

        let mut clicked: Vec<String> = serde_json::from_str(&current)
            .map_err(|e| AppError::Serialization(format!("Corrupt clicked documents: {}", e)))?;
        if !clicked.iter().any(|id| id == document_id) {
            clicked.push(document_id.to_string());
            tx.execute(
                "UPDATE query_audit SET clicked_documents = ?3 WHERE tenant_id = ?1 AND id = ?2",
                params![scope.tenant_id(), audit_id, to_json(&clicked)?],
            )
            .map_err(db_error("Failed to save clicked documents"))?;
        }

        tx.commit().map_err(db_error("Failed to commit click"))?;
        Ok(true)
    }
}
