//! User command handlers.
//!
//! Registration, listing and effective privilege lookup.

use super::context::{open_service, print_json, split_list, IdentityArgs};
use clap::{Args, Subcommand};
use kbase_core::{config::AppConfig, AppError, AppResult};
use kbase_knowledge::{Caller, NewUser, Privilege};
use std::collections::BTreeSet;

/// User management
#[derive(Args, Debug)]
pub struct UserCommand {
    #[command(subcommand)]
    pub action: UserAction,
}

#[derive(Subcommand, Debug)]
pub enum UserAction {
    /// Register a user (invited with --user, otherwise self-registration)
    Add(UserAddCommand),
    /// List the tenant's users
    List(UserListCommand),
}

impl UserCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            UserAction::Add(cmd) => cmd.execute(config),
            UserAction::List(cmd) => cmd.execute(config),
        }
    }
}

/// Register a user
#[derive(Args, Debug)]
pub struct UserAddCommand {
    /// Tenant id
    #[arg(long, env = "KBASE_TENANT")]
    pub tenant: String,

    /// Inviting user id; omit for self-registration or the first user
    #[arg(long, env = "KBASE_USER")]
    pub user: Option<String>,

    /// Display name
    #[arg(long)]
    pub name: String,

    /// Email address (unique within the tenant)
    #[arg(long)]
    pub email: String,

    /// Department
    #[arg(long)]
    pub department: Option<String>,

    /// Role key (default: the tenant's default role)
    #[arg(long)]
    pub role: Option<String>,

    /// Extra privileges granted directly (comma-separated)
    #[arg(long)]
    pub privilege: Vec<String>,

    /// Make the user an org admin
    #[arg(long)]
    pub admin: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl UserAddCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing user add command");

        let direct_privileges = parse_privileges(&self.privilege)?;
        let new_user = NewUser {
            name: self.name.clone(),
            email: self.email.clone(),
            department: self.department.clone(),
            org_role: self.role.clone(),
            direct_privileges,
            is_org_admin: self.admin,
        };

        let inviter = self
            .user
            .as_deref()
            .map(|user| Caller::new(self.tenant.trim(), user.trim()));

        let service = open_service(config)?;
        let user = service.register_user(self.tenant.trim(), new_user, inviter.as_ref())?;

        if self.json {
            print_json(&user)?;
        } else {
            println!(
                "Registered {} <{}> as '{}'{} ({})",
                user.name,
                user.email,
                user.org_role,
                if user.is_org_admin { ", org admin" } else { "" },
                user.id
            );
        }

        Ok(())
    }
}

/// List users
#[derive(Args, Debug)]
pub struct UserListCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl UserListCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = open_service(config)?;
        let users = service.list_users(&self.identity.caller())?;

        if self.json {
            return print_json(&users);
        }

        for user in &users {
            println!(
                "{}  {:<24} {:<32} {:<10} {}{}",
                user.id,
                user.name,
                user.email,
                user.org_role,
                user.department.as_deref().unwrap_or("-"),
                if user.is_org_admin { "  (admin)" } else { "" }
            );
        }
        println!("{} user(s)", users.len());

        Ok(())
    }
}

/// Show effective privileges
#[derive(Args, Debug)]
pub struct PrivilegesCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PrivilegesCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = open_service(config)?;
        let privileges = service.effective_privileges(&self.identity.caller())?;

        if self.json {
            return print_json(&privileges);
        }

        for privilege in &privileges {
            println!("{}", privilege);
        }

        Ok(())
    }
}

fn parse_privileges(values: &[String]) -> AppResult<BTreeSet<Privilege>> {
    split_list(values)
        .iter()
        .map(|name| {
            Privilege::parse(name)
                .ok_or_else(|| AppError::Validation(format!("Unknown privilege: {}", name)))
        })
        .collect()
}
