//! Knowledge map construction.
//!
//! Four rings around the question: documents, their chunks, then
//! keywords. Edges are only ever added between nodes already placed, so
//! every edge references two existing nodes.

use crate::rag::types::{EdgeKind, GraphEdge, GraphNode, GraphPlan, KnowledgeGraph, NodeKind};
use crate::text::{contains_keyword, keywords, truncate_chars};
use crate::types::RetrievedChunk;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::f64::consts::PI;

const QUESTION_ID: &str = "question";
const DOCUMENT_RADIUS: f64 = 220.0;
const CHUNK_RADIUS: f64 = 420.0;
const KEYWORD_RADIUS: f64 = 620.0;
const LABEL_CHARS: usize = 60;

const TAG_LINK_BASE: f64 = 0.4;
const TAG_LINK_STEP: f64 = 0.2;
const CATEGORY_LINK_STRENGTH: f64 = 0.3;
const PLANNED_LINK_STRENGTH: f64 = 0.8;

/// Builds the layered question → documents → chunks → keywords graph.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder {
    max_chunks: usize,
    max_keywords: usize,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(16, 24)
    }
}

struct DocumentInfo<'a> {
    id: &'a str,
    title: &'a str,
    tags: BTreeSet<String>,
    category: Option<String>,
}

impl GraphBuilder {
    pub fn new(max_chunks: usize, max_keywords: usize) -> Self {
        Self {
            max_chunks,
            max_keywords,
        }
    }

    /// Build the graph for `question` from the retrieved `chunks`.
    ///
    /// A plan's chunk, keyword and link choices replace the heuristics
    /// where it supplies them.
    pub fn build(&self, question: &str, chunks: &[RetrievedChunk], plan: Option<&GraphPlan>) -> KnowledgeGraph {
        let mut graph = GraphState::default();

        graph.add_node(GraphNode {
            id: QUESTION_ID.to_string(),
            kind: NodeKind::Question,
            label: truncate_chars(question, LABEL_CHARS),
            layer: NodeKind::Question.layer(),
            x: 0.0,
            y: 0.0,
            document_id: None,
        });

        let documents = distinct_documents(chunks);
        let mut angles: HashMap<&str, f64> = HashMap::new();
        let wedge = 2.0 * PI / documents.len().max(1) as f64;

        for (i, document) in documents.iter().enumerate() {
            let angle = -PI / 2.0 + wedge * i as f64;
            angles.insert(document.id, angle);

            graph.add_node(GraphNode {
                id: document_node_id(document.id),
                kind: NodeKind::Document,
                label: truncate_chars(document.title, LABEL_CHARS),
                layer: NodeKind::Document.layer(),
                x: DOCUMENT_RADIUS * angle.cos(),
                y: DOCUMENT_RADIUS * angle.sin(),
                document_id: Some(document.id.to_string()),
            });
            graph.add_edge(QUESTION_ID, &document_node_id(document.id), EdgeKind::QuestionDocument, 1.0, None);
        }

        let retained = self.retained_chunks(chunks, plan);

        let mut per_document: HashMap<&str, usize> = HashMap::new();
        for chunk in &retained {
            *per_document.entry(chunk.document_id.as_str()).or_default() += 1;
        }

        let mut placed: HashMap<&str, usize> = HashMap::new();
        for chunk in &retained {
            let document_id = chunk.document_id.as_str();
            let siblings = per_document.get(document_id).copied().unwrap_or(1);
            let slot = placed.entry(document_id).or_default();
            let base = angles.get(document_id).copied().unwrap_or(0.0);
            let step = wedge * 0.8 / siblings as f64;
            let angle = base + (*slot as f64 - (siblings as f64 - 1.0) / 2.0) * step;
            *slot += 1;

            let id = chunk_node_id(chunk);
            graph.add_node(GraphNode {
                id: id.clone(),
                kind: NodeKind::Chunk,
                label: truncate_chars(&chunk.chunk.text, LABEL_CHARS),
                layer: NodeKind::Chunk.layer(),
                x: CHUNK_RADIUS * angle.cos(),
                y: CHUNK_RADIUS * angle.sin(),
                document_id: Some(document_id.to_string()),
            });
            graph.add_edge(&document_node_id(document_id), &id, EdgeKind::DocumentChunk, chunk_strength(chunk), None);
        }

        let words = self.keywords(&retained, plan);
        for (i, word) in words.iter().enumerate() {
            let angle = -PI / 2.0 + 2.0 * PI * i as f64 / words.len() as f64;
            let id = keyword_node_id(word);
            graph.add_node(GraphNode {
                id: id.clone(),
                kind: NodeKind::Keyword,
                label: word.clone(),
                layer: NodeKind::Keyword.layer(),
                x: KEYWORD_RADIUS * angle.cos(),
                y: KEYWORD_RADIUS * angle.sin(),
                document_id: None,
            });

            for chunk in retained.iter().filter(|c| contains_keyword(&c.chunk.text, word)) {
                graph.add_edge(&chunk_node_id(chunk), &id, EdgeKind::ChunkKeyword, 0.5, None);
            }
        }

        match plan {
            Some(plan) => {
                for link in &plan.document_links {
                    graph.add_document_link(&link.source, &link.target, PLANNED_LINK_STRENGTH, link.reason.clone());
                }
            }
            None => {
                for (i, a) in documents.iter().enumerate() {
                    for b in &documents[i + 1..] {
                        if let Some((strength, label)) = heuristic_link(a, b) {
                            graph.add_document_link(a.id, b.id, strength, Some(label));
                        }
                    }
                }
            }
        }

        tracing::debug!(
            "Built knowledge map: {} nodes, {} edges (plan: {})",
            graph.graph.nodes.len(),
            graph.graph.edges.len(),
            plan.is_some()
        );

        graph.graph
    }

    fn retained_chunks<'a>(&self, chunks: &'a [RetrievedChunk], plan: Option<&GraphPlan>) -> Vec<&'a RetrievedChunk> {
        let mut seen = HashSet::new();
        let unique: Vec<&RetrievedChunk> = chunks
            .iter()
            .filter(|c| seen.insert(c.excerpt_id()))
            .collect();

        if let Some(plan) = plan.filter(|p| !p.chunks.is_empty()) {
            let wanted: HashSet<&str> = plan.chunks.iter().map(|id| id.trim()).collect();
            let chosen: Vec<&RetrievedChunk> = unique
                .iter()
                .copied()
                .filter(|c| wanted.contains(c.excerpt_id().as_str()))
                .take(self.max_chunks)
                .collect();
            if !chosen.is_empty() {
                return chosen;
            }
            tracing::debug!("Plan named no known excerpts, using retrieval order");
        }

        unique.into_iter().take(self.max_chunks).collect()
    }

    fn keywords(&self, retained: &[&RetrievedChunk], plan: Option<&GraphPlan>) -> Vec<String> {
        if let Some(plan) = plan.filter(|p| !p.keywords.is_empty()) {
            let mut seen = HashSet::new();
            return plan
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty() && seen.insert(k.clone()))
                .take(self.max_keywords)
                .collect();
        }

        keywords(retained.iter().map(|c| c.chunk.text.as_str()), self.max_keywords)
    }
}

#[derive(Default)]
struct GraphState {
    graph: KnowledgeGraph,
    ids: HashSet<String>,
    links: HashSet<(String, String)>,
}

impl GraphState {
    fn add_node(&mut self, node: GraphNode) {
        if self.ids.insert(node.id.clone()) {
            self.graph.nodes.push(node);
        }
    }

    fn add_edge(&mut self, source: &str, target: &str, kind: EdgeKind, strength: f64, label: Option<String>) {
        if source == target || !self.ids.contains(source) || !self.ids.contains(target) {
            return;
        }
        self.graph.edges.push(GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind,
            strength,
            label,
        });
    }

    /// Link two documents once per unordered pair.
    fn add_document_link(&mut self, a: &str, b: &str, strength: f64, label: Option<String>) {
        let (source, target) = (document_node_id(a.trim()), document_node_id(b.trim()));
        let key = if source <= target {
            (source.clone(), target.clone())
        } else {
            (target.clone(), source.clone())
        };

        if source == target || !self.ids.contains(&source) || !self.ids.contains(&target) {
            return;
        }
        if self.links.insert(key) {
            self.add_edge(&source, &target, EdgeKind::DocumentLink, strength, label);
        }
    }
}

fn distinct_documents(chunks: &[RetrievedChunk]) -> Vec<DocumentInfo<'_>> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|c| seen.insert(c.document_id.as_str()))
        .map(|c| DocumentInfo {
            id: &c.document_id,
            title: &c.title,
            tags: c.tags.iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect(),
            category: c
                .category
                .as_deref()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
        })
        .collect()
}

/// Shared tags link strongly (more shared, stronger); a shared category
/// alone links weakly.
fn heuristic_link(a: &DocumentInfo<'_>, b: &DocumentInfo<'_>) -> Option<(f64, String)> {
    let shared: Vec<&str> = a.tags.intersection(&b.tags).map(String::as_str).collect();
    if !shared.is_empty() {
        let strength = (TAG_LINK_BASE + TAG_LINK_STEP * shared.len() as f64).min(1.0);
        return Some((strength, format!("Shared tags: {}", shared.join(", "))));
    }

    match (&a.category, &b.category) {
        (Some(x), Some(y)) if x == y => Some((CATEGORY_LINK_STRENGTH, format!("Same category: {}", x))),
        _ => None,
    }
}

fn chunk_strength(chunk: &RetrievedChunk) -> f64 {
    1.0 / (1.0 + chunk.chunk.chunk_index as f64 * 0.25)
}

fn document_node_id(document_id: &str) -> String {
    format!("doc:{}", document_id)
}

fn chunk_node_id(chunk: &RetrievedChunk) -> String {
    format!("chunk:{}", chunk.excerpt_id())
}

fn keyword_node_id(word: &str) -> String {
    format!("keyword:{}", word)
}
