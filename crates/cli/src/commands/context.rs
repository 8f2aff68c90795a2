//! Shared command plumbing: identity flags, service construction and output.

use clap::Args;
use kbase_core::{config::AppConfig, AppError, AppResult};
use kbase_knowledge::{load_config, BasicTextExtractor, Caller, KnowledgeService, SqliteStore};
use kbase_llm::{create_client, LlmClient, LlmError, ModelChain, ScriptedClient};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Who the command acts as.
#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
    /// Tenant id
    #[arg(long, env = "KBASE_TENANT")]
    pub tenant: String,

    /// User id inside the tenant
    #[arg(long, env = "KBASE_USER")]
    pub user: String,
}

impl IdentityArgs {
    pub fn caller(&self) -> Caller {
        Caller::new(self.tenant.trim(), self.user.trim())
    }
}

/// Build the service from workspace configuration.
pub fn open_service(config: &AppConfig) -> AppResult<KnowledgeService> {
    let db_path = config.database_path();
    tracing::debug!("Opening knowledge store at {:?}", db_path);
    let store = Arc::new(SqliteStore::open(&db_path)?);

    let knowledge = load_config(&config.workspace)?;
    let timeout = Duration::from_secs(config.llm.timeout_secs);
    let client = build_client(config, timeout)?;
    let chain = ModelChain::new(config.llm.preferred_model.clone(), &config.llm.fallback_models);

    KnowledgeService::with_options(
        store,
        client,
        chain,
        knowledge,
        Some(&config.workspace),
        Arc::new(BasicTextExtractor),
        timeout,
    )
}

/// A disabled provider becomes an unconfigured client, which answers
/// questions with document selection.
fn build_client(config: &AppConfig, timeout: Duration) -> AppResult<Arc<dyn LlmClient>> {
    match create_client(
        &config.llm.provider,
        config.llm.endpoint.as_deref(),
        config.resolve_api_key(),
        timeout,
    ) {
        Ok(client) => Ok(client),
        Err(LlmError::NotConfigured(reason)) => {
            tracing::info!("Text generation unavailable: {}", reason);
            Ok(Arc::new(ScriptedClient::unconfigured()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(format!("Failed to serialize output: {}", e)))?;
    println!("{}", output);
    Ok(())
}

/// Split comma-separated flag values, dropping blanks.
pub fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}
