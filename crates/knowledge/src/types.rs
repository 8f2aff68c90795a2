//! Document and chunk types for the knowledge base.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Active,
    Archived,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may see a document inside its tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Public,
    Department,
    Private,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Department => "department",
            Self::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "public" => Some(Self::Public),
            "department" => Some(Self::Department),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded, ordered slice of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub text: String,
    pub chunk_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_page: Option<u32>,
}

impl Chunk {
    pub fn new(text: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            text: text.into(),
            chunk_index,
            start_page: None,
            end_page: None,
        }
    }
}

/// A document stored in a tenant's knowledge base.
///
/// Chunks are loaded separately (see `DocumentStore::chunks`); `chunk_count`
/// reflects the stored list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    pub access_level: AccessLevel,
    pub uploaded_by: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub size_bytes: u64,
    /// SHA-256 of the uploaded bytes.
    pub content_hash: String,
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw upload handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Caller-supplied metadata for a new document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Defaults to the uploader's department.
    #[serde(default)]
    pub department: Option<String>,
    /// Defaults to the tenant's configured access level.
    #[serde(default)]
    pub access_level: Option<AccessLevel>,
}

impl NewDocument {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Result of polling a document's processing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatusReport {
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A chunk returned by retrieval, annotated with its document's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub document_id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub category: Option<String>,
    /// Content hash of the owning document.
    pub hash: String,
    pub chunk: Chunk,
    /// Lexical relevance of the owning document (higher is better).
    pub score: f64,
}

impl RetrievedChunk {
    pub fn from_document(document: &Document, chunk: Chunk, score: f64) -> Self {
        Self {
            document_id: document.id.clone(),
            title: document.title.clone(),
            tags: document.tags.clone(),
            category: document.category.clone(),
            hash: document.content_hash.clone(),
            chunk,
            score,
        }
    }

    /// Stable identifier used by graph plans and audit records.
    pub fn excerpt_id(&self) -> String {
        format!("{}#{}", self.document_id, self.chunk.chunk_index)
    }
}

/// A document offered to the caller in select-documents mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDocument {
    pub document_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Absent when the candidate came from the recent-documents fallback.
    #[serde(default)]
    pub score: Option<f64>,
}

impl CandidateDocument {
    pub fn from_document(document: &Document, score: Option<f64>) -> Self {
        Self {
            document_id: document.id.clone(),
            title: document.title.clone(),
            description: document.description.clone(),
            tags: document.tags.clone(),
            category: document.category.clone(),
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            DocumentStatus::Processing,
            DocumentStatus::Active,
            DocumentStatus::Archived,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("deleted"), None);
    }

    #[test]
    fn test_access_level_parse_is_case_insensitive() {
        assert_eq!(AccessLevel::parse("Private"), Some(AccessLevel::Private));
        assert_eq!(AccessLevel::parse(" department "), Some(AccessLevel::Department));
        assert_eq!(AccessLevel::parse("secret"), None);
    }

    #[test]
    fn test_status_report_skips_missing_error() {
        let report = DocumentStatusReport {
            status: DocumentStatus::Active,
            error: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"status":"active"}"#);
    }

    #[test]
    fn test_excerpt_id() {
        let chunk = RetrievedChunk {
            document_id: "abc123".to_string(),
            title: "Handbook".to_string(),
            tags: vec![],
            category: None,
            hash: "h".to_string(),
            chunk: Chunk::new("text", 2),
            score: 1.0,
        };
        assert_eq!(chunk.excerpt_id(), "abc123#2");
    }
}
