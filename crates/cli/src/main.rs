//! kbase CLI
//!
//! Main entry point for the kbase command-line tool.
//! Drives the multi-tenant knowledge base: tenants, users, uploads and
//! permission-scoped question answering.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    AskCommand, FeedbackCommand, PrivilegesCommand, StatusCommand, TenantCommand, UploadCommand,
    UserCommand,
};
use kbase_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// kbase - permission-scoped knowledge base with grounded answers
#[derive(Parser, Debug)]
#[command(name = "kbase")]
#[command(about = "Permission-scoped multi-tenant knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "KBASE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "KBASE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Text-generation provider (hosted, ollama, none)
    #[arg(short, long, global = true, env = "KBASE_PROVIDER")]
    provider: Option<String>,

    /// Preferred model identifier
    #[arg(short, long, global = true, env = "KBASE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tenant management
    Tenant(TenantCommand),

    /// User management
    User(UserCommand),

    /// Upload files or directories into the knowledge base
    Upload(UploadCommand),

    /// Show a document's processing status
    Status(StatusCommand),

    /// Ask a question
    Ask(AskCommand),

    /// Show the caller's effective privileges
    Privileges(PrivilegesCommand),

    /// Rate an answer or record a clicked citation
    Feedback(FeedbackCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from file and environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_json)?;

    tracing::info!("kbase CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.llm.provider);
    tracing::debug!("Model: {}", config.llm.preferred_model);

    config.validate()?;
    config.ensure_kbase_dir()?;

    let command_name = match &cli.command {
        Commands::Tenant(_) => "tenant",
        Commands::User(_) => "user",
        Commands::Upload(_) => "upload",
        Commands::Status(_) => "status",
        Commands::Ask(_) => "ask",
        Commands::Privileges(_) => "privileges",
        Commands::Feedback(_) => "feedback",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Tenant(cmd) => cmd.execute(&config).await,
        Commands::User(cmd) => cmd.execute(&config).await,
        Commands::Upload(cmd) => cmd.execute(&config).await,
        Commands::Status(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Privileges(cmd) => cmd.execute(&config).await,
        Commands::Feedback(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
