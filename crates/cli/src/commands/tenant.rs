//! Tenant command handler.
//!
//! Creates tenants and manages their roles and settings.

use super::context::{open_service, print_json, IdentityArgs};
use clap::{Args, Subcommand};
use kbase_core::{config::AppConfig, AppError, AppResult};
use kbase_knowledge::{AccessLevel, Role, Tenant, TenantSettings};
use std::path::{Path, PathBuf};

/// Tenant management
#[derive(Args, Debug)]
pub struct TenantCommand {
    #[command(subcommand)]
    pub action: TenantAction,
}

#[derive(Subcommand, Debug)]
pub enum TenantAction {
    /// Create a tenant seeded with the system roles
    Create(TenantCreateCommand),
    /// Show a tenant
    Show(TenantShowCommand),
    /// List or replace the tenant's roles
    Roles(TenantRolesCommand),
    /// Replace the tenant's settings
    Settings(TenantSettingsCommand),
}

impl TenantCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            TenantAction::Create(cmd) => cmd.execute(config),
            TenantAction::Show(cmd) => cmd.execute(config),
            TenantAction::Roles(cmd) => cmd.execute(config),
            TenantAction::Settings(cmd) => cmd.execute(config),
        }
    }
}

/// Create a tenant
#[derive(Args, Debug)]
pub struct TenantCreateCommand {
    /// Organization name
    pub name: String,

    /// Let users join without an invitation
    #[arg(long)]
    pub allow_self_registration: bool,

    /// Maximum users (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub max_users: u32,

    /// Maximum documents (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub max_documents: u32,

    /// Access level for uploads that do not choose one (public, department, private)
    #[arg(long, default_value = "department")]
    pub default_access: String,

    /// Never call a model; always offer document selection
    #[arg(long)]
    pub no_ai: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl TenantCreateCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing tenant create command");

        let default_access_level = parse_access_level(&self.default_access)?;
        let settings = TenantSettings {
            allow_self_registration: self.allow_self_registration,
            max_users: self.max_users,
            max_documents: self.max_documents,
            default_access_level,
            ai_enabled: !self.no_ai,
        };

        let service = open_service(config)?;
        let tenant = service.create_tenant(&self.name, settings)?;

        if self.json {
            print_json(&tenant)?;
        } else {
            println!("Created tenant '{}' ({})", tenant.name, tenant.id);
            println!("Register the first user with: kbase user add --tenant {} ...", tenant.id);
        }

        Ok(())
    }
}

/// Show a tenant
#[derive(Args, Debug)]
pub struct TenantShowCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl TenantShowCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = open_service(config)?;
        // Resolving the caller proves membership before anything is shown.
        service.get_user(&self.identity.caller())?;
        let tenant = service.get_tenant(&self.identity.tenant)?;

        if self.json {
            return print_json(&tenant);
        }

        println!("{} ({})", tenant.name, tenant.id);
        println!("  users:      {}", limit(tenant.user_count, tenant.settings.max_users));
        println!(
            "  documents:  {}",
            limit(tenant.document_count, tenant.settings.max_documents)
        );
        println!("  access:     {}", tenant.settings.default_access_level);
        println!("  ai:         {}", if tenant.settings.ai_enabled { "enabled" } else { "disabled" });
        println!(
            "  self-registration: {}",
            if tenant.settings.allow_self_registration { "allowed" } else { "invite only" }
        );
        print_roles(&tenant);

        Ok(())
    }
}

/// List or replace roles
#[derive(Args, Debug)]
pub struct TenantRolesCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// YAML file with the complete new role list
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl TenantRolesCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = open_service(config)?;
        let caller = self.identity.caller();

        let tenant = match &self.file {
            Some(path) => {
                let roles: Vec<Role> = read_yaml(path)?;
                tracing::info!("Replacing roles from {:?}", path);
                service.replace_roles(&caller, roles)?
            }
            None => {
                service.get_user(&caller)?;
                service.get_tenant(&caller.tenant_id)?
            }
        };

        if self.json {
            print_json(&tenant.roles)
        } else {
            print_roles(&tenant);
            Ok(())
        }
    }
}

/// Replace settings
#[derive(Args, Debug)]
pub struct TenantSettingsCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// YAML file with the new settings; omitted fields take defaults
    #[arg(long)]
    pub file: PathBuf,
}

impl TenantSettingsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let settings: TenantSettings = read_yaml(&self.file)?;
        let service = open_service(config)?;
        let tenant = service.update_settings(&self.identity.caller(), settings)?;
        println!("Updated settings of '{}'", tenant.name);
        Ok(())
    }
}

pub fn parse_access_level(value: &str) -> AppResult<AccessLevel> {
    AccessLevel::parse(value).ok_or_else(|| {
        AppError::Validation(format!(
            "Unknown access level: {} (expected public, department or private)",
            value
        ))
    })
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> AppResult<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("Failed to read {:?}: {}", path, e)))?;
    serde_yaml::from_str(&contents)
        .map_err(|e| AppError::Config(format!("Failed to parse {:?}: {}", path, e)))
}

fn limit(count: u64, max: u32) -> String {
    if max == 0 {
        format!("{}", count)
    } else {
        format!("{}/{}", count, max)
    }
}

fn print_roles(tenant: &Tenant) {
    println!("Roles:");
    for role in &tenant.roles {
        let privileges: Vec<&str> = role.privileges.iter().map(|p| p.as_str()).collect();
        let mut flags = Vec::new();
        if role.is_system {
            flags.push("system");
        }
        if role.is_default {
            flags.push("default");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!("  {}{}: {}", role.key, flags, privileges.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_formatting() {
        assert_eq!(limit(3, 0), "3");
        assert_eq!(limit(3, 10), "3/10");
    }

    #[test]
    fn test_parse_access_level() {
        assert_eq!(parse_access_level("Private").unwrap(), AccessLevel::Private);
        assert!(parse_access_level("secret").is_err());
    }

    #[test]
    fn test_read_roles_yaml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("roles.yaml");
        std::fs::write(
            &path,
            "- key: intern\n  name: Intern\n  privileges: [view_documents]\n  isDefault: true\n",
        )
        .unwrap();

        let roles: Vec<Role> = read_yaml(&path).unwrap();
        assert_eq!(roles[0].key, "intern");
        assert!(roles[0].is_default);
        assert!(!roles[0].is_system);
    }
}
