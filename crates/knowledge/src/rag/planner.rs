//! Model-proposed knowledge map selection.
//!
//! The planner is advisory: any failure (provider error, timeout, output
//! that is not the expected JSON) yields `None` and the graph falls back
//! to its heuristics.

use crate::rag::types::GraphPlan;
use crate::text::truncate_chars;
use crate::types::RetrievedChunk;
use kbase_llm::{LlmClient, LlmRequest, ModelChain};
use kbase_prompt::{build_prompt, PromptDefinition};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const PLAN_EXCERPT_CHARS: usize = 200;
const PLAN_MAX_TOKENS: u32 = 512;

/// Asks the primary model for a [`GraphPlan`].
#[derive(Clone)]
pub struct GraphPlanner {
    client: Arc<dyn LlmClient>,
    chain: ModelChain,
    prompt: PromptDefinition,
    max_chunks: usize,
    max_keywords: usize,
    call_timeout: Duration,
}

impl GraphPlanner {
    pub fn new(
        client: Arc<dyn LlmClient>,
        chain: ModelChain,
        prompt: PromptDefinition,
        max_chunks: usize,
        max_keywords: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            chain,
            prompt,
            max_chunks,
            max_keywords,
            call_timeout,
        }
    }

    pub async fn plan(&self, question: &str, chunks: &[RetrievedChunk]) -> Option<GraphPlan> {
        if chunks.is_empty() || !self.client.is_configured() {
            return None;
        }
        let model = self.chain.primary()?;

        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("documents".to_string(), describe_documents(chunks));
        variables.insert("chunks".to_string(), describe_chunks(chunks));
        variables.insert("maxKeywords".to_string(), self.max_keywords.to_string());
        variables.insert("maxChunks".to_string(), self.max_chunks.to_string());

        let built = match build_prompt(&self.prompt, variables) {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!("Failed to render graph plan prompt: {}", e);
                return None;
            }
        };

        let mut request = LlmRequest::new(built.user, model)
            .with_temperature(0.0)
            .with_max_tokens(PLAN_MAX_TOKENS);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = match tokio::time::timeout(self.call_timeout, self.client.complete(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::debug!("Graph plan request failed: {}", e);
                return None;
            }
            Err(_) => {
                tracing::debug!("Graph plan request timed out");
                return None;
            }
        };

        let plan = parse_plan(&response.content)?;
        Some(sanitize(plan, chunks))
    }
}

fn describe_documents(chunks: &[RetrievedChunk]) -> String {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|c| seen.insert(c.document_id.as_str()))
        .map(|c| {
            let mut line = format!("- {}: {}", c.document_id, c.title);
            if !c.tags.is_empty() {
                line.push_str(&format!(" [tags: {}]", c.tags.join(", ")));
            }
            if let Some(category) = &c.category {
                line.push_str(&format!(" [category: {}]", category));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_chunks(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            format!(
                "- {}: {}",
                c.excerpt_id(),
                truncate_chars(&c.chunk.text, PLAN_EXCERPT_CHARS).replace('\n', " ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the first JSON object in a model response, tolerating code
/// fences and surrounding prose.
fn parse_plan(content: &str) -> Option<GraphPlan> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str::<GraphPlan>(&content[start..=end]) {
        Ok(plan) => Some(plan),
        Err(e) => {
            tracing::debug!("Graph plan was not valid JSON: {}", e);
            None
        }
    }
}

/// Drop ids the plan invented.
fn sanitize(mut plan: GraphPlan, chunks: &[RetrievedChunk]) -> GraphPlan {
    let excerpt_ids: HashSet<String> = chunks.iter().map(|c| c.excerpt_id()).collect();
    let document_ids: HashSet<&str> = chunks.iter().map(|c| c.document_id.as_str()).collect();

    plan.chunks.retain(|id| excerpt_ids.contains(id.trim()));
    plan.document_links.retain(|link| {
        document_ids.contains(link.source.trim()) && document_ids.contains(link.target.trim())
    });
    plan
}
