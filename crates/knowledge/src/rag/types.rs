//! RAG response types.

use crate::types::{CandidateDocument, RetrievedChunk};
use serde::{Deserialize, Serialize};

/// A source reference shown under an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub document_id: String,
    pub title: String,
    pub chunk_index: u32,
    /// Chunk text, truncated with an ellipsis.
    pub excerpt: String,
    /// Positional rank proxy: 1.0 for the first citation, minus 0.1 per
    /// position.
    pub relevance_score: f64,
}

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// A model generated the answer.
    Generated,
    /// Every model failed retryably; excerpts were stitched together.
    Extractive,
    /// No model answer and no grounding chunks.
    NotFound,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Extractive => "extractive",
            Self::NotFound => "not_found",
        }
    }
}

/// Why the caller is asked to pick documents by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// No provider credential or endpoint is configured.
    ProviderUnconfigured,
    /// The provider rejected the configured credential.
    InvalidCredential,
    /// The tenant has AI answering switched off.
    AiDisabled,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderUnconfigured => "provider_unconfigured",
            Self::InvalidCredential => "invalid_credential",
            Self::AiDisabled => "ai_disabled",
        }
    }
}

/// Answer text plus the chunks that grounded it.
#[derive(Debug, Clone)]
pub struct AnswerDraft {
    pub text: String,
    pub mode: AnswerMode,
    pub model_used: Option<String>,
    /// Chunks placed in the prompt (or quoted in an extractive answer).
    pub used_chunks: Vec<RetrievedChunk>,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone)]
pub enum OrchestratorOutcome {
    Answered(AnswerDraft),
    SelectDocuments(SelectionReason),
}

/// Graph node layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Question,
    Document,
    Chunk,
    Keyword,
}

impl NodeKind {
    /// Distance from the root (0 = question).
    pub fn layer(&self) -> u8 {
        match self {
            Self::Question => 0,
            Self::Document => 1,
            Self::Chunk => 2,
            Self::Keyword => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    pub layer: u8,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    QuestionDocument,
    DocumentChunk,
    ChunkKeyword,
    DocumentLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Layered question → documents → chunks → keywords map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl KnowledgeGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn edges_of(&self, kind: EdgeKind) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Whether every edge references two existing nodes.
    pub fn is_consistent(&self) -> bool {
        self.edges
            .iter()
            .all(|e| self.node(&e.source).is_some() && self.node(&e.target).is_some())
    }
}

/// A document relationship proposed by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedLink {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Model-proposed selection for the knowledge map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphPlan {
    pub keywords: Vec<String>,
    /// Excerpt ids (`<document id>#<chunk index>`).
    pub chunks: Vec<String>,
    pub document_links: Vec<PlannedLink>,
}

/// A grounded (or degraded) answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsweredQuestion {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub graph: KnowledgeGraph,
    /// Absent when the audit write failed.
    pub audit_id: Option<String>,
    pub model_used: Option<String>,
    pub answer_mode: AnswerMode,
    pub response_time_ms: u64,
}

/// Candidate documents for the caller to choose from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSelection {
    pub candidates: Vec<CandidateDocument>,
    pub reason: SelectionReason,
    /// How many candidates may be picked.
    pub max_selected: usize,
    pub audit_id: Option<String>,
}

/// Response to a free-form question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QuestionResponse {
    Answered(AnsweredQuestion),
    SelectDocuments(DocumentSelection),
}

impl QuestionResponse {
    pub fn audit_id(&self) -> Option<&str> {
        match self {
            Self::Answered(answer) => answer.audit_id.as_deref(),
            Self::SelectDocuments(selection) => selection.audit_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_documents_wire_shape() {
        let response = QuestionResponse::SelectDocuments(DocumentSelection {
            candidates: Vec::new(),
            reason: SelectionReason::ProviderUnconfigured,
            max_selected: 2,
            audit_id: None,
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["mode"], "select_documents");
        assert_eq!(json["reason"], "provider_unconfigured");
        assert_eq!(json["maxSelected"], 2);
    }

    #[test]
    fn test_graph_consistency() {
        let node = |id: &str| GraphNode {
            id: id.to_string(),
            kind: NodeKind::Document,
            label: id.to_string(),
            layer: 1,
            x: 0.0,
            y: 0.0,
            document_id: None,
        };
        let edge = |source: &str, target: &str| GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind: EdgeKind::DocumentLink,
            strength: 0.5,
            label: None,
        };

        let mut graph = KnowledgeGraph {
            nodes: vec![node("a"), node("b")],
            edges: vec![edge("a", "b")],
        };
        assert!(graph.is_consistent());

        graph.edges.push(edge("a", "ghost"));
        assert!(!graph.is_consistent());
    }

    #[test]
    fn test_plan_parses_partial_json() {
        let plan: GraphPlan = serde_json::from_str(r#"{"keywords": ["travel"]}"#).unwrap();
        assert_eq!(plan.keywords, vec!["travel"]);
        assert!(plan.chunks.is_empty());
        assert!(plan.document_links.is_empty());
    }
}
