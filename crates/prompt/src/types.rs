//! Prompt types for kbase.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDefinition {
    pub id: String,

    pub title: String,

    /// Schema version, `x.y`
    pub api_version: String,

    #[serde(default)]
    pub created_by: String,

    /// Variables every render must supply. A workspace override that
    /// declares none accepts any variable set.
    #[serde(default)]
    pub variables: Vec<String>,

    /// System instruction template (Handlebars)
    #[serde(default)]
    pub system: Option<String>,

    /// User message template (Handlebars)
    pub template: String,

    pub output: PromptOutputSpec,
}

impl PromptDefinition {
    /// Declared variables absent from `provided`, in declaration order.
    pub fn missing_variables<'a>(&'a self, provided: &HashMap<String, String>) -> Vec<&'a str> {
        self.variables
            .iter()
            .filter(|name| !provided.contains_key(name.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Expected shape of the model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutputSpec {
    /// "text", "markdown" or "json"
    pub format: String,
}

impl PromptOutputSpec {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// A rendered prompt ready for a model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub system: Option<String>,
    pub user: String,
    pub metadata: BuiltPromptMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltPromptMetadata {
    pub source_prompt_id: String,
    /// Output format copied from the definition.
    pub output_format: String,
    pub resolved_variables: HashMap<String, String>,
}

impl BuiltPrompt {
    pub fn new(
        system: Option<String>,
        user: String,
        definition: &PromptDefinition,
        resolved_variables: HashMap<String, String>,
    ) -> Self {
        Self {
            system,
            user,
            metadata: BuiltPromptMetadata {
                source_prompt_id: definition.id.clone(),
                output_format: definition.output.format.clone(),
                resolved_variables,
            },
        }
    }
}
