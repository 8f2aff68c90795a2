//! Prompt loader.
//!
//! Built-in prompts are compiled into the binary. A workspace can override
//! any of them by placing `<id>.yml` in `.kbase/prompts/`.

use crate::types::PromptDefinition;
use kbase_core::{AppError, AppResult};
use std::path::Path;

/// Grounded answer prompt id.
pub const RAG_ANSWER_PROMPT: &str = "rag.answer";

/// Knowledge-map plan prompt id.
pub const GRAPH_PLAN_PROMPT: &str = "graph.plan";

const BUILTIN_PROMPTS: [(&str, &str); 2] = [
    (RAG_ANSWER_PROMPT, include_str!("../prompts/rag.answer.yml")),
    (GRAPH_PLAN_PROMPT, include_str!("../prompts/graph.plan.yml")),
];

/// Load a prompt definition by ID.
///
/// Looks for `<workspace>/.kbase/prompts/<id>.yml` first and falls back to
/// the built-in definition.
///
/// # Example
/// ```no_run
/// use kbase_prompt::load_prompt;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(None, "rag.answer")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: Option<&Path>, prompt_id: &str) -> AppResult<PromptDefinition> {
    if let Some(workspace) = workspace_path {
        let prompt_file = workspace
            .join(".kbase/prompts")
            .join(format!("{}.yml", prompt_id));

        if prompt_file.exists() {
            tracing::debug!("Loading prompt override from: {:?}", prompt_file);

            let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
                AppError::Prompt(format!("Failed to read prompt file {:?}: {}", prompt_file, e))
            })?;

            return parse_prompt(&contents, &prompt_file.display().to_string());
        }
    }

    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e)))?;

    validate_prompt(&definition)?;

    tracing::debug!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// List prompt ids available to a workspace (built-ins plus overrides).
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = BUILTIN_PROMPTS.iter().map(|(id, _)| id.to_string()).collect();

    let prompts_dir = workspace_path.join(".kbase/prompts");
    if prompts_dir.exists() {
        for entry in walkdir::WalkDir::new(&prompts_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !prompt_ids.iter().any(|id| id == stem) {
                        prompt_ids.push(stem.to_string());
                    }
                }
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt("Prompt template cannot be empty".to_string()));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
