//! Answer orchestration.
//!
//! Builds the grounding prompt and walks the model chain one model at a
//! time. Rate limits, unknown models and timeouts move on to the next
//! model; any other failure stops the loop. When every model failed
//! retryably the answer is stitched together from the excerpts instead.
//! A missing or rejected credential sends the caller to document
//! selection.

use crate::config::PromptConfig;
use crate::rag::prompt::{build_context, render_answer_prompt};
use crate::rag::types::{AnswerDraft, AnswerMode, OrchestratorOutcome, SelectionReason};
use crate::text::truncate_chars;
use crate::types::RetrievedChunk;
use kbase_core::AppResult;
use kbase_llm::{LlmClient, LlmError, LlmRequest, ModelChain};
use kbase_prompt::PromptDefinition;
use std::sync::Arc;
use std::time::Duration;

/// Opening line of every extractive answer.
pub const EXTRACTIVE_HEADER: &str = "Here are the most relevant excerpts from your documents:";

/// Answer when neither a model nor the documents could help.
pub const NOT_FOUND_MESSAGE: &str =
    "I could not find information about this in the available documents.";

/// Per-call deadline used when none is configured.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives one answer through the model chain and its degraded modes.
#[derive(Clone)]
pub struct AnswerOrchestrator {
    client: Arc<dyn LlmClient>,
    chain: ModelChain,
    prompt: PromptDefinition,
    config: PromptConfig,
    call_timeout: Duration,
}

impl AnswerOrchestrator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        chain: ModelChain,
        prompt: PromptDefinition,
        config: PromptConfig,
    ) -> Self {
        Self {
            client,
            chain,
            prompt,
            config,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn chain(&self) -> &ModelChain {
        &self.chain
    }

    pub fn is_available(&self) -> bool {
        self.client.is_configured()
    }

    /// Answer `question` from `chunks`.
    ///
    /// `chunks` are in retrieval rank order; only the first
    /// `context_chunks` reach the prompt. Fails only on a fatal provider
    /// error other than a credential rejection.
    pub async fn answer(
        &self,
        question: &str,
        organization: &str,
        chunks: &[RetrievedChunk],
        preferred_model: Option<&str>,
    ) -> AppResult<OrchestratorOutcome> {
        if !self.client.is_configured() {
            tracing::info!(
                "Provider '{}' is not configured, switching to document selection",
                self.client.provider_name()
            );
            return Ok(OrchestratorOutcome::SelectDocuments(
                SelectionReason::ProviderUnconfigured,
            ));
        }

        let used: Vec<RetrievedChunk> = chunks
            .iter()
            .take(self.config.context_chunks)
            .cloned()
            .collect();

        let context = build_context(&used, self.config.excerpt_chars);
        let built = render_answer_prompt(&self.prompt, organization, &context, question)?;

        let mut request = LlmRequest::new(built.user, "")
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let chain = self.chain.preferring(preferred_model);
        let total = chain.len();

        for (attempt, model) in chain.models().iter().enumerate() {
            tracing::debug!("Model attempt {}/{}: {}", attempt + 1, total, model);

            match self.call(&request.for_model(model.as_str())).await {
                Ok(text) => {
                    tracing::info!(
                        "Answer generated by {} after {} attempt(s) from {} chunks",
                        model,
                        attempt + 1,
                        used.len()
                    );
                    return Ok(OrchestratorOutcome::Answered(AnswerDraft {
                        text,
                        mode: AnswerMode::Generated,
                        model_used: Some(model.clone()),
                        used_chunks: used,
                    }));
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("Model {} unavailable, trying next: {}", model, e);
                }
                Err(e) if e.is_credential_error() => {
                    tracing::warn!("Provider rejected the credential, switching to document selection");
                    return Ok(OrchestratorOutcome::SelectDocuments(
                        SelectionReason::InvalidCredential,
                    ));
                }
                Err(LlmError::NotConfigured(message)) => {
                    tracing::warn!("Provider reported missing configuration: {}", message);
                    return Ok(OrchestratorOutcome::SelectDocuments(
                        SelectionReason::ProviderUnconfigured,
                    ));
                }
                Err(e) => {
                    tracing::error!("Model {} failed fatally: {}", model, e);
                    return Err(e.into());
                }
            }
        }

        tracing::warn!(
            "All {} model(s) failed retryably, answering from excerpts",
            total
        );
        Ok(OrchestratorOutcome::Answered(self.extractive_answer(&used)))
    }

    /// Deterministic answer built from excerpts, without a model call.
    ///
    /// Excerpts are grouped by document title in rank order. With no
    /// chunks the canonical not-found message is returned.
    pub fn extractive_answer(&self, chunks: &[RetrievedChunk]) -> AnswerDraft {
        let used: Vec<RetrievedChunk> = chunks
            .iter()
            .take(self.config.context_chunks)
            .cloned()
            .collect();

        if used.is_empty() {
            return AnswerDraft {
                text: NOT_FOUND_MESSAGE.to_string(),
                mode: AnswerMode::NotFound,
                model_used: None,
                used_chunks: Vec::new(),
            };
        }

        let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
        for chunk in &used {
            let excerpt = truncate_chars(&chunk.chunk.text, self.config.excerpt_chars);
            match groups.iter_mut().find(|(title, _)| *title == chunk.title) {
                Some((_, excerpts)) => excerpts.push(excerpt),
                None => groups.push((chunk.title.as_str(), vec![excerpt])),
            }
        }

        let mut text = String::from(EXTRACTIVE_HEADER);
        for (title, excerpts) in &groups {
            text.push_str("\n\n**");
            text.push_str(title);
            text.push_str("**");
            for excerpt in excerpts {
                text.push_str("\n> ");
                text.push_str(&excerpt.replace('\n', " "));
            }
        }

        AnswerDraft {
            text,
            mode: AnswerMode::Extractive,
            model_used: None,
            used_chunks: used,
        }
    }

    /// One bounded model call; empty output counts as a fatal empty response.
    async fn call(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let response = tokio::time::timeout(self.call_timeout, self.client.complete(request))
            .await
            .map_err(|_| LlmError::Timeout {
                model: request.model.clone(),
                secs: self.call_timeout.as_secs(),
            })??;

        let text = response.content.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::prompt::NO_CONTEXT_MARKER;
    use crate::types::Chunk;
    use kbase_core::AppError;
    use kbase_llm::ScriptedClient;
    use kbase_prompt::{load_prompt, RAG_ANSWER_PROMPT};

    fn rate_limited(model: &str) -> LlmError {
        LlmError::RateLimited {
            model: model.to_string(),
            message: "429".to_string(),
        }
    }

    fn chunk(document_id: &str, title: &str, index: u32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            document_id: document_id.to_string(),
            title: title.to_string(),
            tags: Vec::new(),
            category: None,
            hash: "h".to_string(),
            chunk: Chunk::new(text, index),
            score: 1.0,
        }
    }

    fn orchestrator(client: Arc<ScriptedClient>) -> AnswerOrchestrator {
        let chain = ModelChain::new("primary", &["fallback-a".to_string(), "fallback-b".to_string()]);
        AnswerOrchestrator::new(
            client,
            chain,
            load_prompt(None, RAG_ANSWER_PROMPT).unwrap(),
            PromptConfig::default(),
        )
    }

    fn draft(outcome: OrchestratorOutcome) -> AnswerDraft {
        match outcome {
            OrchestratorOutcome::Answered(draft) => draft,
            other => panic!("expected an answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_model_success() {
        let client = Arc::new(ScriptedClient::new().respond("primary", "Managers approve travel."));
        let chunks = vec![chunk("d1", "Travel policy", 0, "Managers approve travel.")];

        let result = draft(
            orchestrator(client.clone())
                .answer("Who approves travel?", "Acme", &chunks, None)
                .await
                .unwrap(),
        );

        assert_eq!(result.mode, AnswerMode::Generated);
        assert_eq!(result.model_used.as_deref(), Some("primary"));
        assert_eq!(result.text, "Managers approve travel.");
        assert_eq!(client.attempted_models(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_falls_back_on_rate_limit() {
        let client = Arc::new(
            ScriptedClient::new()
                .fail("primary", rate_limited("primary"))
                .respond("fallback-a", "From fallback"),
        );

        let result = draft(
            orchestrator(client.clone())
                .answer("q", "Acme", &[], None)
                .await
                .unwrap(),
        );

        assert_eq!(result.model_used.as_deref(), Some("fallback-a"));
        assert_eq!(client.attempted_models(), vec!["primary", "fallback-a"]);
    }

    #[tokio::test]
    async fn test_exhaustion_is_extractive() {
        let client = Arc::new(ScriptedClient::new().fail_always(rate_limited("any")));
        let chunks = vec![
            chunk("d1", "Travel policy", 0, "Book flights early."),
            chunk("d1", "Travel policy", 1, "Economy class only."),
            chunk("d2", "Expense guide", 0, "Keep receipts."),
        ];

        let result = draft(
            orchestrator(client.clone())
                .answer("travel rules", "Acme", &chunks, None)
                .await
                .unwrap(),
        );

        assert_eq!(client.call_count(), 3);
        assert_eq!(result.mode, AnswerMode::Extractive);
        assert!(result.text.starts_with("Here are the most relevant excerpts"));
        assert!(result.text.contains("Travel policy"));
        assert_eq!(result.text.matches("**Travel policy**").count(), 1);
        assert!(result.model_used.is_none());
        assert_eq!(result.used_chunks.len(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_without_chunks_is_not_found() {
        let client = Arc::new(ScriptedClient::new().fail_always(rate_limited("any")));

        let result = draft(
            orchestrator(client.clone())
                .answer("q", "Acme", &[], None)
                .await
                .unwrap(),
        );

        assert_eq!(result.mode, AnswerMode::NotFound);
        assert_eq!(result.text, NOT_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_loop() {
        let client = Arc::new(ScriptedClient::new().fail("primary", LlmError::EmptyResponse));

        let err = orchestrator(client.clone())
            .answer("q", "Acme", &[], None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Llm(_)));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_answer_is_fatal() {
        let client = Arc::new(ScriptedClient::new().respond("primary", "   "));

        let result = orchestrator(client.clone()).answer("q", "Acme", &[], None).await;

        assert!(matches!(result, Err(AppError::Llm(_))));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_credential_rejection_selects_documents() {
        let client = Arc::new(
            ScriptedClient::new().fail("primary", LlmError::InvalidCredential("bad key".into())),
        );

        let outcome = orchestrator(client.clone())
            .answer("q", "Acme", &[], None)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            OrchestratorOutcome::SelectDocuments(SelectionReason::InvalidCredential)
        ));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_never_called() {
        let client = Arc::new(ScriptedClient::unconfigured());

        let outcome = orchestrator(client.clone())
            .answer("q", "Acme", &[], None)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            OrchestratorOutcome::SelectDocuments(SelectionReason::ProviderUnconfigured)
        ));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_context_marker_reaches_model() {
        let client = Arc::new(ScriptedClient::new().respond_always("Not found in documents."));

        let result = draft(
            orchestrator(client.clone())
                .answer("What is the budget?", "Acme", &[], None)
                .await
                .unwrap(),
        );

        assert_eq!(result.mode, AnswerMode::Generated);
        assert!(result.used_chunks.is_empty());
        assert!(client.calls()[0].prompt.contains(NO_CONTEXT_MARKER));
    }

    #[tokio::test]
    async fn test_prompt_uses_at_most_three_chunks() {
        let client = Arc::new(ScriptedClient::new().respond_always("ok"));
        let chunks: Vec<RetrievedChunk> = (0..5)
            .map(|i| chunk("d1", "Doc", i, &format!("excerpt number {}", i)))
            .collect();

        let result = draft(
            orchestrator(client.clone())
                .answer("q", "Acme", &chunks, None)
                .await
                .unwrap(),
        );

        assert_eq!(result.used_chunks.len(), 3);
        let prompt = &client.calls()[0].prompt;
        assert!(prompt.contains("excerpt number 2"));
        assert!(!prompt.contains("excerpt number 3"));
        assert!(client.calls()[0].system.as_deref().unwrap_or("").contains("Acme"));
    }

    #[tokio::test]
    async fn test_preferred_model_goes_first() {
        let client = Arc::new(ScriptedClient::new().respond_always("ok"));

        let result = draft(
            orchestrator(client.clone())
                .answer("q", "Acme", &[], Some("fallback-b"))
                .await
                .unwrap(),
        );

        assert_eq!(result.model_used.as_deref(), Some("fallback-b"));
    }

    #[tokio::test]
    async fn test_timeout_is_retryable() {
        struct Slow;

        #[async_trait::async_trait]
        impl LlmClient for Slow {
            fn provider_name(&self) -> &str {
                "slow"
            }

            async fn complete(
                &self,
                request: &LlmRequest,
            ) -> Result<kbase_llm::LlmResponse, LlmError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LlmError::ModelNotFound {
                    model: request.model.clone(),
                    message: "unreachable".to_string(),
                })
            }
        }

        let orchestrator = AnswerOrchestrator::new(
            Arc::new(Slow),
            ModelChain::new("only", &[]),
            load_prompt(None, RAG_ANSWER_PROMPT).unwrap(),
            PromptConfig::default(),
        )
        .with_call_timeout(Duration::from_millis(50));

        let chunks = vec![chunk("d1", "Travel policy", 0, "Book early.")];
        let result = draft(orchestrator.answer("q", "Acme", &chunks, None).await.unwrap());
        assert_eq!(result.mode, AnswerMode::Extractive);
    }
}
