//! Prompt builder for rendering templates with variables.

use crate::types::{BuiltPrompt, PromptDefinition};
use handlebars::Handlebars;
use kbase_core::{AppError, AppResult};
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Both the system instruction and the user template are rendered with
/// the same variables. Every variable the definition declares must be
/// present; undeclared ones that are absent render as empty strings.
///
/// # Example
/// ```no_run
/// use kbase_prompt::{build_prompt, load_prompt};
/// use std::collections::HashMap;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = load_prompt(None, "rag.answer")?;
/// let mut vars = HashMap::new();
/// vars.insert("organization".to_string(), "Acme".to_string());
/// vars.insert("context".to_string(), String::new());
/// vars.insert("question".to_string(), "What is the travel budget?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let missing = definition.missing_variables(&variables);
    if !missing.is_empty() {
        return Err(AppError::Prompt(format!(
            "Missing prompt variable(s) for {}: {}",
            definition.id,
            missing.join(", ")
        )));
    }

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, &variables))
        .transpose()?
        .map(|s| s.trim_end().to_string());

    let user = render_template(&definition.template, &variables)?
        .trim_end()
        .to_string();

    Ok(BuiltPrompt::new(system, user, definition, variables))
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output; document excerpts must not be HTML-escaped.
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PromptOutputSpec;

    fn definition(system: Option<&str>, template: &str, variables: &[&str]) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            variables: variables.iter().map(|v| v.to_string()).collect(),
            system: system.map(str::to_string),
            template: template.to_string(),
            output: PromptOutputSpec {
                format: "markdown".to_string(),
            },
        }
    }

    #[test]
    fn test_render_simple_template() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Hello, world!".to_string());

        let result = render_template("Question: {{question}}", &vars).unwrap();
        assert_eq!(result, "Question: Hello, world!");
    }

    #[test]
    fn test_no_html_escaping() {
        let mut vars = HashMap::new();
        vars.insert("context".to_string(), "A & B <tag>".to_string());

        let result = render_template("{{context}}", &vars).unwrap();
        assert_eq!(result, "A & B <tag>");
    }

    #[test]
    fn test_build_prompt_renders_system_and_user() {
        let def = definition(
            Some("Assistant for {{organization}}\n"),
            "Q: {{question}}\n",
            &["organization", "question"],
        );
        let mut vars = HashMap::new();
        vars.insert("organization".to_string(), "Acme".to_string());
        vars.insert("question".to_string(), "Why?".to_string());

        let built = build_prompt(&def, vars).unwrap();
        assert_eq!(built.system.as_deref(), Some("Assistant for Acme"));
        assert_eq!(built.user, "Q: Why?");
        assert_eq!(built.metadata.source_prompt_id, "test.prompt");
        assert_eq!(built.metadata.output_format, "markdown");
    }

    #[test]
    fn test_build_prompt_rejects_missing_declared_variable() {
        let def = definition(None, "{{context}} {{question}}", &["context", "question"]);
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Why?".to_string());

        let err = build_prompt(&def, vars).unwrap_err();
        assert!(matches!(err, AppError::Prompt(_)));
        assert!(err.to_string().contains("context"));
    }

    #[test]
    fn test_undeclared_variables_render_empty() {
        let def = definition(None, "Q: {{question}}{{suffix}}", &[]);
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Why?".to_string());

        let built = build_prompt(&def, vars).unwrap();
        assert_eq!(built.user, "Q: Why?");
    }

    #[test]
    fn test_render_template_missing_variable() {
        let vars = HashMap::new();
        let result = render_template("Question: {{missing}}", &vars);
        assert!(result.is_ok());
    }
}
