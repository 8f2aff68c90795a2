//! Knowledge service facade.
//!
//! Resolves the caller inside their tenant, checks privileges, and wires
//! retrieval, answering, citations, the knowledge map and the audit trail
//! together.

use crate::access::{effective_privileges, is_admin_equivalent, require_privilege, PERMISSION_DENIED};
use crate::audit::{AuditStatus, Feedback, QueryAudit, QueryAuditRecord, QueryType};
use crate::chunker::Chunker;
use crate::config::KnowledgeConfig;
use crate::extract::{BasicTextExtractor, TextExtractor};
use crate::ingest::{IngestHandle, Ingestor};
use crate::rag::{
    AnswerDraft, AnswerMode, AnswerOrchestrator, AnsweredQuestion, CitationBuilder,
    DocumentSelection, GraphBuilder, GraphPlan, GraphPlanner, OrchestratorOutcome,
    QuestionResponse, SelectionReason,
};
use crate::retrieval::RetrievalEngine;
use crate::store::KnowledgeStore;
use crate::tenant::{NewUser, Privilege, Role, Tenant, TenantSettings, User};
use crate::types::{Document, DocumentStatusReport, NewDocument, UploadedFile};
use chrono::Utc;
use kbase_core::{AppError, AppResult};
use kbase_llm::{LlmClient, ModelChain};
use kbase_prompt::{load_prompt, GRAPH_PLAN_PROMPT, RAG_ANSWER_PROMPT};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identity of the user making a request, as asserted by the
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub tenant_id: String,
    pub user_id: String,
}

impl Caller {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Entry point for every knowledge operation.
pub struct KnowledgeService {
    store: Arc<dyn KnowledgeStore>,
    config: KnowledgeConfig,
    retrieval: RetrievalEngine,
    ingestor: Ingestor,
    orchestrator: AnswerOrchestrator,
    planner: Option<GraphPlanner>,
    citations: CitationBuilder,
    graph: GraphBuilder,
    audit: QueryAudit,
}

impl KnowledgeService {
    /// Build the service around an injected store and model client.
    ///
    /// Prompt overrides are read from `<workspace>/.kbase/prompts/` when a
    /// workspace is given; otherwise the built-in definitions are used.
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        client: Arc<dyn LlmClient>,
        chain: ModelChain,
        config: KnowledgeConfig,
        workspace: Option<&Path>,
    ) -> AppResult<Self> {
        Self::with_options(
            store,
            client,
            chain,
            config,
            workspace,
            Arc::new(BasicTextExtractor),
            crate::rag::ask::DEFAULT_CALL_TIMEOUT,
        )
    }

    pub fn with_options(
        store: Arc<dyn KnowledgeStore>,
        client: Arc<dyn LlmClient>,
        chain: ModelChain,
        config: KnowledgeConfig,
        workspace: Option<&Path>,
        extractor: Arc<dyn TextExtractor>,
        call_timeout: Duration,
    ) -> AppResult<Self> {
        let answer_prompt = load_prompt(workspace, RAG_ANSWER_PROMPT)?;

        let planner = if config.graph.ai_plan {
            let plan_prompt = load_prompt(workspace, GRAPH_PLAN_PROMPT)?;
            Some(GraphPlanner::new(
                client.clone(),
                chain.clone(),
                plan_prompt,
                config.graph.max_chunks,
                config.graph.max_keywords,
                call_timeout,
            ))
        } else {
            None
        };

        let orchestrator = AnswerOrchestrator::new(client, chain, answer_prompt, config.prompt.clone())
            .with_call_timeout(call_timeout);

        Ok(Self {
            retrieval: RetrievalEngine::new(store.clone(), config.retrieval.clone()),
            ingestor: Ingestor::new(store.clone(), extractor, Chunker::from_config(&config.chunking)),
            orchestrator,
            planner,
            citations: CitationBuilder::new(config.citations.excerpt_chars),
            graph: GraphBuilder::new(config.graph.max_chunks, config.graph.max_keywords),
            audit: QueryAudit::new(store.clone()),
            store,
            config,
        })
    }

    pub fn config(&self) -> &KnowledgeConfig {
        &self.config
    }

    pub fn create_tenant(&self, name: &str, settings: TenantSettings) -> AppResult<Tenant> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Organization name is required".to_string()));
        }

        let tenant = Tenant::new(name, settings);
        self.store.insert_tenant(&tenant)?;
        tracing::info!("Created tenant {} ('{}')", tenant.id, tenant.name);
        Ok(tenant)
    }

    pub fn get_tenant(&self, tenant_id: &str) -> AppResult<Tenant> {
        self.store
            .get_tenant(tenant_id)?
            .ok_or_else(|| AppError::NotFound("Organization not found".to_string()))
    }

    /// Replace the tenant's whole role set.
    pub fn replace_roles(&self, caller: &Caller, roles: Vec<Role>) -> AppResult<Tenant> {
        let (mut tenant, user) = self.resolve(caller)?;
        require_privilege(&user, &tenant, Privilege::ManageRoles)?;

        tenant.replace_roles(roles)?;
        self.store.save_tenant(&tenant)?;
        tracing::info!("Replaced roles of tenant {} ({} roles)", tenant.id, tenant.roles.len());
        Ok(tenant)
    }

    pub fn update_settings(&self, caller: &Caller, settings: TenantSettings) -> AppResult<Tenant> {
        let (mut tenant, user) = self.resolve(caller)?;
        require_privilege(&user, &tenant, Privilege::ManageSettings)?;

        tenant.settings = settings;
        self.store.save_tenant(&tenant)?;
        Ok(tenant)
    }

    /// Add a user to a tenant.
    ///
    /// Without an inviter this is self-registration, which the tenant must
    /// allow, except for its very first user. An inviter needs
    /// `manage_users`, and only org admins may create org admins.
    pub fn register_user(&self, tenant_id: &str, new_user: NewUser, inviter: Option<&Caller>) -> AppResult<User> {
        let name = new_user.name.trim().to_string();
        let email = new_user.email.trim().to_lowercase();
        if name.is_empty() {
            return Err(AppError::Validation("User name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(AppError::Validation("A valid email address is required".to_string()));
        }

        let tenant = self.get_tenant(tenant_id)?;
        let bootstrap = tenant.user_count == 0;

        let (is_org_admin, direct_privileges) = match inviter {
            Some(inviter) => {
                if inviter.tenant_id != tenant.id {
                    return Err(AppError::Permission(PERMISSION_DENIED.to_string()));
                }
                let (_, inviter) = self.resolve(inviter)?;
                require_privilege(&inviter, &tenant, Privilege::ManageUsers)?;
                if new_user.is_org_admin && !is_admin_equivalent(&inviter) {
                    return Err(AppError::Permission(PERMISSION_DENIED.to_string()));
                }
                (new_user.is_org_admin, new_user.direct_privileges)
            }
            None if bootstrap => (new_user.is_org_admin, new_user.direct_privileges),
            None => {
                if !tenant.settings.allow_self_registration {
                    return Err(AppError::Permission(PERMISSION_DENIED.to_string()));
                }
                (false, BTreeSet::new())
            }
        };

        let org_role = match new_user.org_role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(key) => tenant
                .role(key)
                .map(|role| role.key.clone())
                .ok_or_else(|| AppError::Validation(format!("Unknown role: {}", key)))?,
            None => tenant
                .default_role()
                .map(|role| role.key.clone())
                .ok_or_else(|| AppError::Validation("Organization has no default role".to_string()))?,
        };

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.id.clone(),
            name,
            email,
            department: new_user
                .department
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            org_role,
            direct_privileges,
            is_org_admin,
            created_at: Utc::now(),
        };

        if !self.store.insert_user(&user, tenant.settings.max_users)? {
            return Err(AppError::Validation(
                "User limit reached for this organization".to_string(),
            ));
        }

        tracing::info!(
            "Registered user {} in tenant {} with role '{}'",
            user.id,
            tenant.id,
            user.org_role
        );
        Ok(user)
    }

    pub fn get_user(&self, caller: &Caller) -> AppResult<User> {
        self.resolve(caller).map(|(_, user)| user)
    }

    pub fn list_users(&self, caller: &Caller) -> AppResult<Vec<User>> {
        let (tenant, user) = self.resolve(caller)?;
        require_privilege(&user, &tenant, Privilege::ManageUsers)?;
        self.store.list_users(&tenant.scope())
    }

    pub fn effective_privileges(&self, caller: &Caller) -> AppResult<BTreeSet<Privilege>> {
        let (tenant, user) = self.resolve(caller)?;
        Ok(effective_privileges(&user, &tenant))
    }

    pub async fn upload_document(
        &self,
        caller: &Caller,
        file: UploadedFile,
        metadata: NewDocument,
    ) -> AppResult<(Document, IngestHandle)> {
        let (tenant, user) = self.resolve(caller)?;
        self.ingestor.upload_document(file, metadata, &user, &tenant).await
    }

    pub async fn reprocess_document(
        &self,
        caller: &Caller,
        document_id: &str,
        file: UploadedFile,
    ) -> AppResult<IngestHandle> {
        let (tenant, user) = self.resolve(caller)?;
        self.ingestor
            .reprocess_document(document_id, file, &user, &tenant)
            .await
    }

    pub fn get_document_status(&self, caller: &Caller, document_id: &str) -> AppResult<DocumentStatusReport> {
        let (_, user) = self.resolve(caller)?;
        self.ingestor.get_document_status(document_id, &user)
    }

    /// Answer a free-form question from the caller's visible documents.
    pub async fn answer_question(
        &self,
        caller: &Caller,
        question: &str,
        preferred_model: Option<&str>,
    ) -> AppResult<QuestionResponse> {
        let started = Instant::now();
        let question = validate_question(question)?;
        let (tenant, user) = self.resolve(caller)?;
        require_privilege(&user, &tenant, Privilege::QueryAi)?;

        let chunks = self.retrieval.find_relevant_chunks(
            question,
            &user,
            self.config.retrieval.top_documents,
        );

        let outcome = if tenant.settings.ai_enabled {
            self.orchestrator
                .answer(question, &tenant.name, &chunks, preferred_model)
                .await
        } else {
            Ok(OrchestratorOutcome::SelectDocuments(SelectionReason::AiDisabled))
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.audit_failure(&user, question, QueryType::Question, &e, started);
                return Err(e);
            }
        };

        match outcome {
            OrchestratorOutcome::Answered(draft) => {
                let answered = self
                    .finish_answer(&user, question, QueryType::Question, draft, started)
                    .await;
                Ok(QuestionResponse::Answered(answered))
            }
            OrchestratorOutcome::SelectDocuments(reason) => {
                let candidates = self.retrieval.candidate_documents(
                    question,
                    &user,
                    self.config.selection.candidate_count,
                )?;

                let record = QueryAuditRecord::new(&user, question, QueryType::Question)
                    .with_outcome(AuditStatus::Degraded, "select_documents", None)
                    .with_response_time(elapsed_ms(started));
                let audit_id = self.audit.log_best_effort(&user.scope(), &record);

                tracing::info!(
                    "Offering {} candidate documents ({})",
                    candidates.len(),
                    reason.as_str()
                );

                Ok(QuestionResponse::SelectDocuments(DocumentSelection {
                    candidates,
                    reason,
                    max_selected: self.config.selection.max_selected,
                    audit_id,
                }))
            }
        }
    }

    /// Answer a question from documents the caller picked.
    pub async fn answer_question_with_selected_documents(
        &self,
        caller: &Caller,
        question: &str,
        document_ids: &[String],
    ) -> AppResult<AnsweredQuestion> {
        let started = Instant::now();
        let question = validate_question(question)?;
        let (tenant, user) = self.resolve(caller)?;
        require_privilege(&user, &tenant, Privilege::QueryAi)?;

        let chunks = self.retrieval.selected_chunks(
            &user,
            document_ids,
            self.config.selection.max_selected,
        )?;

        let draft = if tenant.settings.ai_enabled {
            match self
                .orchestrator
                .answer(question, &tenant.name, &chunks, None)
                .await
            {
                Ok(OrchestratorOutcome::Answered(draft)) => draft,
                Ok(OrchestratorOutcome::SelectDocuments(reason)) => {
                    tracing::info!("Model unavailable for selected documents ({})", reason.as_str());
                    self.orchestrator.extractive_answer(&chunks)
                }
                Err(e) => {
                    self.audit_failure(&user, question, QueryType::SelectedDocuments, &e, started);
                    return Err(e);
                }
            }
        } else {
            self.orchestrator.extractive_answer(&chunks)
        };

        Ok(self
            .finish_answer(&user, question, QueryType::SelectedDocuments, draft, started)
            .await)
    }

    /// Citations and the knowledge map run side by side off the chunks the
    /// answer used.
    async fn finish_answer(
        &self,
        user: &User,
        question: &str,
        query_type: QueryType,
        draft: AnswerDraft,
        started: Instant,
    ) -> AnsweredQuestion {
        let plan = self.plan_graph(question, &draft).await;

        let (citations, graph) = futures::join!(
            async { self.citations.build(&draft.used_chunks) },
            async { self.graph.build(question, &draft.used_chunks, plan.as_ref()) }
        );

        let response_time_ms = elapsed_ms(started);
        let status = match draft.mode {
            AnswerMode::Generated => AuditStatus::Success,
            AnswerMode::Extractive | AnswerMode::NotFound => AuditStatus::Degraded,
        };
        let record = QueryAuditRecord::new(user, question, query_type)
            .with_cited_chunks(&draft.used_chunks)
            .with_outcome(status, draft.mode.as_str(), draft.model_used.as_deref())
            .with_response_time(response_time_ms);
        let audit_id = self.audit.log_best_effort(&user.scope(), &record);

        AnsweredQuestion {
            answer: draft.text,
            citations,
            graph,
            audit_id,
            model_used: draft.model_used,
            answer_mode: draft.mode,
            response_time_ms,
        }
    }

    async fn plan_graph(&self, question: &str, draft: &AnswerDraft) -> Option<GraphPlan> {
        match &self.planner {
            Some(planner) if draft.mode == AnswerMode::Generated => {
                planner.plan(question, &draft.used_chunks).await
            }
            _ => None,
        }
    }

    fn audit_failure(&self, user: &User, question: &str, query_type: QueryType, error: &AppError, started: Instant) {
        let record = QueryAuditRecord::new(user, question, query_type)
            .with_error(error.to_string())
            .with_response_time(elapsed_ms(started));
        self.audit.log_best_effort(&user.scope(), &record);
    }

    pub fn get_audit(&self, caller: &Caller, audit_id: &str) -> AppResult<QueryAuditRecord> {
        let (_, user) = self.resolve(caller)?;
        self.audit.get(&user, audit_id)
    }

    pub fn attach_feedback(
        &self,
        caller: &Caller,
        audit_id: &str,
        feedback: Feedback,
        rating: Option<u8>,
        comment: Option<String>,
    ) -> AppResult<()> {
        let (_, user) = self.resolve(caller)?;
        self.audit.attach_feedback(&user, audit_id, feedback, rating, comment)
    }

    pub fn mark_clicked(&self, caller: &Caller, audit_id: &str, document_id: &str) -> AppResult<()> {
        let (_, user) = self.resolve(caller)?;
        self.audit.mark_clicked(&user, audit_id, document_id)
    }

    /// Load the caller's tenant and user; the user is looked up inside the
    /// tenant's scope only.
    fn resolve(&self, caller: &Caller) -> AppResult<(Tenant, User)> {
        if caller.tenant_id.trim().is_empty() {
            return Err(AppError::Validation("Missing tenant context".to_string()));
        }

        let tenant = self.get_tenant(&caller.tenant_id)?;
        let user = self
            .store
            .get_user(&tenant.scope(), &caller.user_id)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok((tenant, user))
    }
}

fn validate_question(question: &str) -> AppResult<&str> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question cannot be empty".to_string()));
    }
    Ok(question)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
