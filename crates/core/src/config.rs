//! Configuration management for kbase.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - Config file (`.kbase/config.yaml` or `KBASE_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric: the SQLite database, prompt
//! overrides and knowledge settings live under `.kbase/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 3] = ["hosted", "ollama", "none"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .kbase/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// SQLite database path override (default: .kbase/kbase.sqlite)
    pub database: Option<PathBuf>,

    /// Text-generation provider settings
    pub llm: LlmSettings,

    /// Log level override
    pub log_level: Option<String>,

    /// Emit JSON log lines
    pub log_json: bool,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Text-generation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    /// Provider identifier ("hosted", "ollama", "none")
    pub provider: String,

    /// Custom endpoint URL
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Resolved API key (never written to disk)
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Model tried first
    pub preferred_model: String,

    /// Models tried in order after the preferred one fails retryably
    #[serde(default)]
    pub fallback_models: Vec<String>,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "KBASE_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "hosted".to_string(),
            endpoint: None,
            api_key_env: default_api_key_env(),
            api_key: None,
            preferred_model: "gemini-2.0-flash".to_string(),
            fallback_models: vec![
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-flash-8b".to_string(),
            ],
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    database: Option<String>,
    llm: Option<LlmSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            database: None,
            llm: LlmSettings::default(),
            log_level: None,
            log_json: false,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and environment.
    ///
    /// Environment variables:
    /// - `KBASE_WORKSPACE`: Override workspace path
    /// - `KBASE_CONFIG`: Path to config file
    /// - `KBASE_DATABASE`: SQLite database path
    /// - `KBASE_PROVIDER`: Provider identifier
    /// - `KBASE_MODEL`: Preferred model
    /// - `KBASE_ENDPOINT`: Provider endpoint
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// The API key is read from the variable named by `llm.apiKeyEnv`
    /// (default `KBASE_API_KEY`).
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("KBASE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("KBASE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.kbase_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env();
        Ok(config)
    }

    /// Environment variables override the YAML config.
    fn apply_env(&mut self) {
        if let Ok(database) = std::env::var("KBASE_DATABASE") {
            self.database = Some(PathBuf::from(database));
        }

        if let Ok(provider) = std::env::var("KBASE_PROVIDER") {
            self.llm.provider = provider;
        }

        if let Ok(model) = std::env::var("KBASE_MODEL") {
            self.llm.preferred_model = model;
        }

        if let Ok(endpoint) = std::env::var("KBASE_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        self.llm.api_key = std::env::var(&self.llm.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(database) = config_file.database {
            result.database = Some(PathBuf::from(database));
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        if let Some(llm) = config_file.llm {
            result.llm = llm;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.llm.provider = provider;
        }

        if let Some(model) = model {
            self.llm.preferred_model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .kbase directory.
    pub fn kbase_dir(&self) -> PathBuf {
        self.workspace.join(".kbase")
    }

    /// Ensure the .kbase directory exists.
    pub fn ensure_kbase_dir(&self) -> AppResult<()> {
        let dir = self.kbase_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .kbase directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolved SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.workspace.join(path),
            None => self.kbase_dir().join("kbase.sqlite"),
        }
    }

    /// API key for the configured provider, if one was found.
    pub fn resolve_api_key(&self) -> Option<&str> {
        self.llm.api_key.as_deref()
    }

    /// Validate configuration for the active provider.
    ///
    /// A missing API key is not an error here: the answer pipeline treats an
    /// unconfigured provider as a degraded mode, not a failure.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.llm.provider.to_lowercase();

        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.llm.preferred_model.trim().is_empty() {
            return Err(AppError::Config("Preferred model must not be empty".to_string()));
        }

        if self.llm.timeout_secs == 0 {
            return Err(AppError::Config("LLM timeout must be at least 1 second".to_string()));
        }

        if provider == "hosted" && self.llm.api_key.is_none() {
            tracing::warn!(
                "No API key found in {}; answers will use document selection mode",
                self.llm.api_key_env
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "hosted");
        assert_eq!(config.llm.fallback_models.len(), 2);
        assert_eq!(config.llm.timeout_secs, 30);
        assert!(!config.verbose);
        assert!(!config.no_color);
    }

    #[test]
    fn test_database_path_defaults_under_kbase_dir() {
        let config = AppConfig::default();
        assert!(config.database_path().ends_with(".kbase/kbase.sqlite"));
    }

    #[test]
    fn test_relative_database_path_is_workspace_relative() {
        let config = AppConfig {
            workspace: PathBuf::from("/srv/kb"),
            database: Some(PathBuf::from("data/kb.sqlite")),
            ..Default::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/srv/kb/data/kb.sqlite"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("ollama".to_string()),
            Some("llama3.2".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.llm.provider, "ollama");
        assert_eq!(overridden.llm.preferred_model, "llama3.2");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
database: kb.sqlite
llm:
  provider: ollama
  endpoint: http://localhost:11434
  preferredModel: llama3.2
  fallbackModels: [mistral]
  timeoutSecs: 10
logging:
  level: debug
  color: false
  json: true
"#,
        )
        .unwrap();

        let merged = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(merged.llm.provider, "ollama");
        assert_eq!(merged.llm.fallback_models, vec!["mistral".to_string()]);
        assert_eq!(merged.llm.timeout_secs, 10);
        assert_eq!(merged.llm.api_key_env, "KBASE_API_KEY");
        assert_eq!(merged.log_level, Some("debug".to_string()));
        assert!(merged.no_color);
        assert!(merged.log_json);
        assert_eq!(merged.database, Some(PathBuf::from("kb.sqlite")));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.llm.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_key_is_not_an_error() {
        let mut config = AppConfig::default();
        config.llm.api_key = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = AppConfig::default();
        config.llm.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
