//! Ask command handler.
//!
//! Answers a question from the caller's visible documents, or from the
//! documents picked with `--documents` after a selection response.

use super::context::{open_service, print_json, split_list, IdentityArgs};
use clap::Args;
use kbase_core::{config::AppConfig, AppError, AppResult};
use kbase_knowledge::{AnsweredQuestion, DocumentSelection, QuestionResponse};

/// Ask a question
#[derive(Args, Debug)]
pub struct AskCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// The question to ask
    pub question: String,

    /// Answer only from these document ids (comma-separated)
    #[arg(short, long)]
    pub documents: Vec<String>,

    /// Print the knowledge map nodes and edges
    #[arg(long)]
    pub graph: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        if self.question.trim().is_empty() {
            return Err(AppError::Validation("No question provided".to_string()));
        }

        let service = open_service(config)?;
        let caller = self.identity.caller();
        let documents = split_list(&self.documents);

        let response = if documents.is_empty() {
            // The global --model flag already sets the chain's first model.
            service.answer_question(&caller, &self.question, None).await?
        } else {
            QuestionResponse::Answered(
                service
                    .answer_question_with_selected_documents(&caller, &self.question, &documents)
                    .await?,
            )
        };

        if self.json {
            return print_json(&response);
        }

        match &response {
            QuestionResponse::Answered(answer) => self.print_answer(answer),
            QuestionResponse::SelectDocuments(selection) => print_selection(selection),
        }

        Ok(())
    }

    fn print_answer(&self, answer: &AnsweredQuestion) {
        println!("{}", answer.answer);

        if !answer.citations.is_empty() {
            println!();
            println!("Sources:");
            for (i, citation) in answer.citations.iter().enumerate() {
                println!(
                    "  [{}] {} ({} #{}, relevance {:.1})",
                    i + 1,
                    citation.title,
                    citation.document_id,
                    citation.chunk_index,
                    citation.relevance_score
                );
            }
        }

        if self.graph {
            println!();
            println!(
                "Knowledge map: {} nodes, {} edges",
                answer.graph.nodes.len(),
                answer.graph.edges.len()
            );
            for node in &answer.graph.nodes {
                println!("  L{} {:<40} {}", node.layer, node.id, node.label);
            }
            for edge in &answer.graph.edges {
                println!("  {} -> {} ({:.2})", edge.source, edge.target, edge.strength);
            }
        }

        println!();
        println!(
            "[{} via {} in {}ms{}]",
            answer.answer_mode.as_str(),
            answer.model_used.as_deref().unwrap_or("excerpts"),
            answer.response_time_ms,
            answer
                .audit_id
                .as_deref()
                .map(|id| format!(", audit {}", id))
                .unwrap_or_default()
        );
    }
}

fn print_selection(selection: &DocumentSelection) {
    println!(
        "Answers are unavailable right now ({}). Pick up to {} document(s) and ask again with --documents:",
        selection.reason.as_str(),
        selection.max_selected
    );
    for candidate in &selection.candidates {
        println!("  {}  {}", candidate.document_id, candidate.title);
        if let Some(description) = &candidate.description {
            println!("      {}", description);
        }
    }
    if selection.candidates.is_empty() {
        println!("  (no documents available)");
    }
}
