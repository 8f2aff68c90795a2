//! Tenant- and visibility-filtered lexical retrieval.

use crate::access::{can_view, VisibilityFilter, PERMISSION_DENIED};
use crate::config::RetrievalConfig;
use crate::store::KnowledgeStore;
use crate::tenant::User;
use crate::text::fts_query;
use crate::types::{CandidateDocument, DocumentStatus, RetrievedChunk};
use kbase_core::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::Arc;

/// Finds grounding chunks for a question.
#[derive(Clone)]
pub struct RetrievalEngine {
    store: Arc<dyn KnowledgeStore>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn KnowledgeStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// Ranked chunks from the `limit` best matching documents the caller
    /// can see, at most `chunks_per_document` from each.
    ///
    /// Never fails: an unusable query or a search error yields an empty
    /// list, which callers treat as "no grounding found".
    pub fn find_relevant_chunks(&self, query: &str, caller: &User, limit: usize) -> Vec<RetrievedChunk> {
        match self.search(query, caller, limit) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!("Search unavailable, continuing without grounding: {}", e);
                Vec::new()
            }
        }
    }

    fn search(&self, query: &str, caller: &User, limit: usize) -> AppResult<Vec<RetrievedChunk>> {
        let Some(expression) = fts_query(query) else {
            tracing::debug!("Query '{}' has no searchable terms", query);
            return Ok(Vec::new());
        };

        let scope = caller.scope();
        let visibility = VisibilityFilter::for_user(caller);
        let documents = self
            .store
            .search_documents(&scope, &expression, &visibility, limit)?;

        let mut results = Vec::new();
        for (document, score) in documents {
            if !can_view(caller, &document) {
                tracing::warn!("Search returned document {} the caller cannot see", document.id);
                continue;
            }

            let chunks = self.store.chunks(
                &scope,
                &document.id,
                Some(self.config.chunks_per_document),
            )?;
            results.extend(
                chunks
                    .into_iter()
                    .map(|chunk| RetrievedChunk::from_document(&document, chunk, score)),
            );
        }

        tracing::info!(
            "Retrieved {} chunks for user {} (tenant {})",
            results.len(),
            caller.id,
            caller.tenant_id
        );

        Ok(results)
    }

    /// Documents to offer when the caller has to pick sources by hand.
    ///
    /// Falls back to the most recently updated visible documents when the
    /// query matches nothing.
    pub fn candidate_documents(
        &self,
        query: &str,
        caller: &User,
        count: usize,
    ) -> AppResult<Vec<CandidateDocument>> {
        let scope = caller.scope();
        let visibility = VisibilityFilter::for_user(caller);

        if let Some(expression) = fts_query(query) {
            match self
                .store
                .search_documents(&scope, &expression, &visibility, count)
            {
                Ok(matches) if !matches.is_empty() => {
                    return Ok(matches
                        .iter()
                        .map(|(document, score)| CandidateDocument::from_document(document, Some(*score)))
                        .collect());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Candidate search failed, using recent documents: {}", e),
            }
        }

        let recent = self.store.recent_documents(&scope, &visibility, count)?;
        Ok(recent
            .iter()
            .map(|document| CandidateDocument::from_document(document, None))
            .collect())
    }

    /// Chunks of documents the caller picked explicitly.
    ///
    /// Absent and invisible ids get the same generic permission error so
    /// the response does not reveal which documents exist.
    pub fn selected_chunks(
        &self,
        caller: &User,
        document_ids: &[String],
        max_selected: usize,
    ) -> AppResult<Vec<RetrievedChunk>> {
        let mut seen = HashSet::new();
        let ids: Vec<&str> = document_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .collect();

        if ids.is_empty() {
            return Err(AppError::Validation(
                "Select at least one document".to_string(),
            ));
        }
        if ids.len() > max_selected {
            return Err(AppError::Validation(format!(
                "Select at most {} documents",
                max_selected
            )));
        }

        let scope = caller.scope();
        let mut results = Vec::new();

        for id in ids {
            let document = match self.store.get_document(&scope, id)? {
                Some(document) if can_view(caller, &document) => document,
                _ => return Err(AppError::Permission(PERMISSION_DENIED.to_string())),
            };

            if document.status != DocumentStatus::Active {
                return Err(AppError::Validation(format!(
                    "Document '{}' is not ready ({})",
                    document.title, document.status
                )));
            }

            let chunks = self.store.chunks(
                &scope,
                &document.id,
                Some(self.config.chunks_per_document),
            )?;
            results.extend(
                chunks
                    .into_iter()
                    .map(|chunk| RetrievedChunk::from_document(&document, chunk, 1.0)),
            );
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, SqliteStore, TenantStore};
    use crate::tenant::{Tenant, TenantSettings};
    use crate::types::{AccessLevel, Chunk, Document};
    use chrono::Utc;
    use std::collections::BTreeSet;

    struct Fixture {
        store: Arc<SqliteStore>,
        tenant: Tenant,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(SqliteStore::open_in_memory().unwrap());
            let tenant = Tenant::new("Acme", TenantSettings::default());
            store.insert_tenant(&tenant).unwrap();
            Self { store, tenant }
        }

        fn engine(&self) -> RetrievalEngine {
            RetrievalEngine::new(self.store.clone(), RetrievalConfig::default())
        }

        fn user(&self, id: &str, department: Option<&str>, admin: bool) -> User {
            User {
                id: id.to_string(),
                tenant_id: self.tenant.id.clone(),
                name: id.to_string(),
                email: format!("{}@example.com", id),
                department: department.map(str::to_string),
                org_role: "employee".to_string(),
                direct_privileges: BTreeSet::new(),
                is_org_admin: admin,
                created_at: Utc::now(),
            }
        }

        fn add(&self, id: &str, title: &str, level: AccessLevel, owner: &str, chunks: usize) {
            let now = Utc::now();
            let document = Document {
                id: id.to_string(),
                tenant_id: self.tenant.id.clone(),
                title: title.to_string(),
                description: None,
                tags: Vec::new(),
                category: None,
                department: Some("sales".to_string()),
                access_level: level,
                uploaded_by: owner.to_string(),
                status: DocumentStatus::Processing,
                error: None,
                file_name: format!("{}.txt", id),
                mime_type: None,
                size_bytes: 1,
                content_hash: format!("hash-{}", id),
                chunk_count: 0,
                created_at: now,
                updated_at: now,
            };
            let scope = self.tenant.scope();
            self.store.insert_document(&scope, &document, 0).unwrap();

            let chunks: Vec<Chunk> = (0..chunks)
                .map(|i| Chunk::new(format!("{} section {}", title, i), i as u32))
                .collect();
            let content: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            self.store
                .complete_processing(&scope, id, &content.join("\n"), &chunks)
                .unwrap();
        }
    }

    #[test]
    fn test_caps_chunks_per_document() {
        let fx = Fixture::new();
        fx.add("d1", "Expense policy", AccessLevel::Public, "owner", 6);

        let chunks = fx
            .engine()
            .find_relevant_chunks("expense", &fx.user("u1", None, false), 5);

        assert_eq!(chunks.len(), 3);
        let indices: Vec<u32> = chunks.iter().map(|c| c.chunk.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(chunks[0].title, "Expense policy");
        assert_eq!(chunks[0].hash, "hash-d1");
    }

    #[test]
    fn test_private_document_hidden_from_others() {
        let fx = Fixture::new();
        fx.add("mine", "Salary review", AccessLevel::Private, "owner", 1);

        let engine = fx.engine();
        let stranger = fx.user("u1", Some("sales"), false);
        assert!(engine.find_relevant_chunks("salary", &stranger, 5).is_empty());

        let owner = fx.user("owner", None, false);
        assert_eq!(engine.find_relevant_chunks("salary", &owner, 5).len(), 1);

        let admin = fx.user("boss", None, true);
        assert_eq!(engine.find_relevant_chunks("salary", &admin, 5).len(), 1);
    }

    #[test]
    fn test_stop_word_query_returns_empty() {
        let fx = Fixture::new();
        fx.add("d1", "Expense policy", AccessLevel::Public, "owner", 1);

        let chunks = fx
            .engine()
            .find_relevant_chunks("what is the", &fx.user("u1", None, false), 5);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_two_letter_terms_match_titles() {
        let fx = Fixture::new();
        fx.add("hr", "HR", AccessLevel::Public, "owner", 1);
        fx.add("d2", "Expense policy", AccessLevel::Public, "owner", 1);

        let chunks = fx
            .engine()
            .find_relevant_chunks("HR or IT?", &fx.user("u1", None, false), 5);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].document_id, "hr");
    }

    #[test]
    fn test_candidates_fall_back_to_recent() {
        let fx = Fixture::new();
        fx.add("d1", "Expense policy", AccessLevel::Public, "owner", 1);
        fx.add("d2", "Hidden notes", AccessLevel::Private, "owner", 1);

        let candidates = fx
            .engine()
            .candidate_documents("zebra", &fx.user("u1", None, false), 5)
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].document_id, "d1");
        assert!(candidates[0].score.is_none());
    }

    #[test]
    fn test_candidates_prefer_matches() {
        let fx = Fixture::new();
        fx.add("d1", "Expense policy", AccessLevel::Public, "owner", 1);
        fx.add("d2", "Holiday calendar", AccessLevel::Public, "owner", 1);

        let candidates = fx
            .engine()
            .candidate_documents("holiday", &fx.user("u1", None, false), 5)
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].document_id, "d2");
        assert!(candidates[0].score.is_some());
    }

    #[test]
    fn test_selected_chunks_hide_existence() {
        let fx = Fixture::new();
        fx.add("secret", "Board minutes", AccessLevel::Private, "owner", 1);
        let engine = fx.engine();
        let user = fx.user("u1", None, false);

        let invisible = engine
            .selected_chunks(&user, &["secret".to_string()], 2)
            .unwrap_err();
        let missing = engine
            .selected_chunks(&user, &["nope".to_string()], 2)
            .unwrap_err();

        assert_eq!(invisible.to_string(), missing.to_string());
        assert!(matches!(invisible, AppError::Permission(_)));
    }

    #[test]
    fn test_selected_chunks_limits() {
        let fx = Fixture::new();
        fx.add("a", "Alpha", AccessLevel::Public, "owner", 2);
        fx.add("b", "Beta", AccessLevel::Public, "owner", 1);
        fx.add("c", "Gamma", AccessLevel::Public, "owner", 1);
        let engine = fx.engine();
        let user = fx.user("u1", None, false);

        assert!(matches!(
            engine.selected_chunks(&user, &[], 2),
            Err(AppError::Validation(_))
        ));

        let three = ["a", "b", "c"].map(String::from);
        assert!(matches!(
            engine.selected_chunks(&user, &three, 2),
            Err(AppError::Validation(_))
        ));

        let two = ["a", "b", "a"].map(String::from);
        let chunks = engine.selected_chunks(&user, &two, 2).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].document_id, "a");
        assert_eq!(chunks[2].document_id, "b");
    }
}
