//! Provider and model-chain types.

use serde::{Deserialize, Serialize};

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// HTTPS text-generation API authenticated with an API key header
    Hosted,
    /// Local Ollama runtime
    Ollama,
    /// Generation disabled
    Disabled,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hosted" | "gemini" => Some(Self::Hosted),
            "ollama" => Some(Self::Ollama),
            "none" | "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosted => "hosted",
            Self::Ollama => "ollama",
            Self::Disabled => "none",
        }
    }
}

/// Ordered list of models to try: the preferred model first, then the
/// fixed fallbacks. Duplicates and blank names are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelChain {
    models: Vec<String>,
}

impl ModelChain {
    /// Build a chain from a preferred model and fallbacks.
    pub fn new(preferred: impl Into<String>, fallbacks: &[String]) -> Self {
        let mut chain = Self::default();
        chain.push(preferred.into());
        for model in fallbacks {
            chain.push(model.clone());
        }
        chain
    }

    fn push(&mut self, model: String) {
        let model = model.trim().to_string();
        if !model.is_empty() && !self.models.contains(&model) {
            self.models.push(model);
        }
    }

    /// The same chain with `preferred` moved to the front.
    pub fn preferring(&self, preferred: Option<&str>) -> Self {
        match preferred {
            Some(model) => Self::new(model, &self.models),
            None => self.clone(),
        }
    }

    /// Models in attempt order.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// First model in the chain.
    pub fn primary(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_parsing() {
        assert_eq!(ProviderType::parse("hosted"), Some(ProviderType::Hosted));
        assert_eq!(ProviderType::parse("Gemini"), Some(ProviderType::Hosted));
        assert_eq!(ProviderType::parse("ollama"), Some(ProviderType::Ollama));
        assert_eq!(ProviderType::parse("none"), Some(ProviderType::Disabled));
        assert_eq!(ProviderType::parse("unknown"), None);
    }

    #[test]
    fn test_model_chain_order_and_dedup() {
        let chain = ModelChain::new("a", &["b".to_string(), "a".to_string(), " ".to_string(), "c".to_string()]);
        assert_eq!(chain.models(), &["a", "b", "c"]);
        assert_eq!(chain.primary(), Some("a"));
    }

    #[test]
    fn test_model_chain_preferring() {
        let chain = ModelChain::new("a", &["b".to_string(), "c".to_string()]);
        assert_eq!(chain.preferring(Some("c")).models(), &["c", "a", "b"]);
        assert_eq!(chain.preferring(Some("z")).models(), &["z", "a", "b", "c"]);
        assert_eq!(chain.preferring(None), chain);
    }
}
