//! Retrieval-augmented answering.
//!
//! The orchestrator produces the answer text; citations and the knowledge
//! map are derived from the chunks it used afterwards.

pub mod ask;
pub mod citations;
pub mod graph;
pub mod planner;
pub mod prompt;
pub mod types;

pub use ask::{AnswerOrchestrator, EXTRACTIVE_HEADER, NOT_FOUND_MESSAGE};
pub use citations::CitationBuilder;
pub use graph::GraphBuilder;
pub use planner::GraphPlanner;
pub use prompt::NO_CONTEXT_MARKER;
pub use types::{
    AnswerDraft, AnswerMode, AnsweredQuestion, Citation, DocumentSelection, EdgeKind, GraphEdge,
    GraphNode, GraphPlan, KnowledgeGraph, NodeKind, OrchestratorOutcome, PlannedLink,
    QuestionResponse, SelectionReason,
};
