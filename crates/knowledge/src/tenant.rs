//! Tenants, roles, privileges and users.
//!
//! A tenant owns its role set as an embedded collection. Roles are value
//! objects: they are only ever replaced as a whole through
//! [`Tenant::replace_roles`] and persisted with the tenant in one write.

use crate::types::AccessLevel;
use chrono::{DateTime, Utc};
use kbase_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// A named capability checked before an action is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    ViewDocuments,
    UploadDocuments,
    EditDocuments,
    DeleteDocuments,
    QueryAi,
    ViewAnalytics,
    ManageUsers,
    ManageRoles,
    ManageSettings,
    ExportData,
}

impl Privilege {
    /// Every known privilege.
    pub const ALL: [Privilege; 10] = [
        Privilege::ViewDocuments,
        Privilege::UploadDocuments,
        Privilege::EditDocuments,
        Privilege::DeleteDocuments,
        Privilege::QueryAi,
        Privilege::ViewAnalytics,
        Privilege::ManageUsers,
        Privilege::ManageRoles,
        Privilege::ManageSettings,
        Privilege::ExportData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewDocuments => "view_documents",
            Self::UploadDocuments => "upload_documents",
            Self::EditDocuments => "edit_documents",
            Self::DeleteDocuments => "delete_documents",
            Self::QueryAi => "query_ai",
            Self::ViewAnalytics => "view_analytics",
            Self::ManageUsers => "manage_users",
            Self::ManageRoles => "manage_roles",
            Self::ManageSettings => "manage_settings",
            Self::ExportData => "export_data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|p| p.as_str() == normalized)
    }

    pub fn all() -> BTreeSet<Privilege> {
        Self::ALL.into_iter().collect()
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named bundle of privileges inside one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Lower-cased key, unique within the tenant.
    pub key: String,
    pub name: String,
    pub privileges: BTreeSet<Privilege>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_default: bool,
}

impl Role {
    pub fn new(
        key: impl AsRef<str>,
        name: impl Into<String>,
        privileges: impl IntoIterator<Item = Privilege>,
    ) -> Self {
        Self {
            key: normalize_role_key(key.as_ref()),
            name: name.into(),
            privileges: privileges.into_iter().collect(),
            is_system: false,
            is_default: false,
        }
    }

    fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

pub fn normalize_role_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Roles every new tenant starts with.
pub fn system_roles() -> Vec<Role> {
    use Privilege::*;

    vec![
        Role::new("admin", "Administrator", Privilege::ALL).system(),
        Role::new(
            "manager",
            "Manager",
            [
                ViewDocuments,
                UploadDocuments,
                EditDocuments,
                DeleteDocuments,
                QueryAi,
                ViewAnalytics,
                ManageUsers,
                ExportData,
            ],
        )
        .system(),
        Role::new("employee", "Employee", [ViewDocuments, UploadDocuments, QueryAi])
            .system()
            .as_default(),
        Role::new("viewer", "Viewer", [ViewDocuments, QueryAi]).system(),
    ]
}

/// Recognized tenant options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantSettings {
    pub allow_self_registration: bool,
    /// 0 = unlimited
    pub max_users: u32,
    /// 0 = unlimited
    pub max_documents: u32,
    /// Applied when an upload does not choose an access level.
    pub default_access_level: AccessLevel,
    /// When false the tenant never calls a model and always gets
    /// select-documents mode.
    pub ai_enabled: bool,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            allow_self_registration: false,
            max_users: 0,
            max_documents: 0,
            default_access_level: AccessLevel::Department,
            ai_enabled: true,
        }
    }
}

/// An isolated customer workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub roles: Vec<Role>,
    pub settings: TenantSettings,
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub user_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a tenant seeded with the system roles.
    pub fn new(name: impl Into<String>, settings: TenantSettings) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            roles: system_roles(),
            settings,
            document_count: 0,
            user_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Look up a role by key (case-insensitive).
    pub fn role(&self, key: &str) -> Option<&Role> {
        let key = normalize_role_key(key);
        self.roles.iter().find(|role| role.key == key)
    }

    pub fn default_role(&self) -> Option<&Role> {
        self.roles.iter().find(|role| role.is_default)
    }

    /// Replace the whole role set after validating it.
    ///
    /// Keys are lower-cased and must be unique, at most one role may be the
    /// default, and every system role of the current set must still exist.
    pub fn replace_roles(&mut self, roles: Vec<Role>) -> AppResult<()> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(roles.len());

        for mut role in roles {
            role.key = normalize_role_key(&role.key);
            if role.key.is_empty() {
                return Err(AppError::Validation("Role key cannot be empty".to_string()));
            }
            if !seen.insert(role.key.clone()) {
                return Err(AppError::Validation(format!(
                    "Duplicate role key: {}",
                    role.key
                )));
            }
            normalized.push(role);
        }

        if normalized.iter().filter(|role| role.is_default).count() > 1 {
            return Err(AppError::Validation(
                "At most one role can be the default".to_string(),
            ));
        }

        for system in self.roles.iter().filter(|role| role.is_system) {
            match normalized.iter_mut().find(|role| role.key == system.key) {
                Some(role) => role.is_system = true,
                None => {
                    return Err(AppError::Validation(format!(
                        "System role '{}' cannot be removed",
                        system.key
                    )))
                }
            }
        }

        self.roles = normalized;
        Ok(())
    }

    pub fn scope(&self) -> TenantScope {
        TenantScope {
            tenant_id: self.id.clone(),
        }
    }
}

/// A member of exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub department: Option<String>,
    /// Key of the user's role in the tenant.
    pub org_role: String,
    #[serde(default)]
    pub direct_privileges: BTreeSet<Privilege>,
    #[serde(default)]
    pub is_org_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn scope(&self) -> TenantScope {
        TenantScope {
            tenant_id: self.tenant_id.clone(),
        }
    }
}

/// Registration request for a new user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub department: Option<String>,
    /// Falls back to the tenant's default role.
    #[serde(default)]
    pub org_role: Option<String>,
    #[serde(default)]
    pub direct_privileges: BTreeSet<Privilege>,
    #[serde(default)]
    pub is_org_admin: bool,
}

/// Proof that an operation runs inside one tenant.
///
/// Only obtainable from a loaded [`Tenant`] or [`User`]; every document,
/// chunk and audit query binds its tenant id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantScope {
    tenant_id: String,
}

impl TenantScope {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_names() {
        assert_eq!(Privilege::ALL.len(), 10);
        assert_eq!(Privilege::QueryAi.as_str(), "query_ai");
        assert_eq!(Privilege::parse("UPLOAD_DOCUMENTS"), Some(Privilege::UploadDocuments));
        assert_eq!(Privilege::parse("fly"), None);

        let json = serde_json::to_string(&Privilege::ManageUsers).unwrap();
        assert_eq!(json, "\"manage_users\"");
    }

    #[test]
    fn test_new_tenant_has_system_roles() {
        let tenant = Tenant::new("Acme", TenantSettings::default());

        assert!(tenant.role("admin").is_some());
        assert!(tenant.role("Manager").is_some());
        assert_eq!(tenant.default_role().map(|r| r.key.as_str()), Some("employee"));
        assert!(tenant.roles.iter().all(|r| r.is_system));
        assert_eq!(tenant.roles.iter().filter(|r| r.is_default).count(), 1);
    }

    #[test]
    fn test_replace_roles_normalizes_keys() {
        let mut tenant = Tenant::new("Acme", TenantSettings::default());
        let mut roles = tenant.roles.clone();
        roles.push(Role::new("  Intern ", "Intern", [Privilege::ViewDocuments]));

        tenant.replace_roles(roles).unwrap();
        assert!(tenant.role("intern").is_some());
        assert!(!tenant.role("intern").unwrap().is_system);
    }

    #[test]
    fn test_replace_roles_rejects_duplicates() {
        let mut tenant = Tenant::new("Acme", TenantSettings::default());
        let mut roles = tenant.roles.clone();
        roles.push(Role::new("EMPLOYEE", "Employee again", [Privilege::ViewDocuments]));

        let err = tenant.replace_roles(roles).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_replace_roles_rejects_two_defaults() {
        let mut tenant = Tenant::new("Acme", TenantSettings::default());
        let mut roles = tenant.roles.clone();
        roles.push(Role::new("intern", "Intern", [Privilege::QueryAi]).as_default());

        assert!(tenant.replace_roles(roles).is_err());
    }

    #[test]
    fn test_replace_roles_keeps_system_roles() {
        let mut tenant = Tenant::new("Acme", TenantSettings::default());
        let roles: Vec<Role> = tenant
            .roles
            .iter()
            .filter(|r| r.key != "viewer")
            .cloned()
            .collect();

        assert!(tenant.replace_roles(roles).is_err());
        assert!(tenant.role("viewer").is_some());
    }

    #[test]
    fn test_settings_defaults_from_partial_yaml() {
        let settings: TenantSettings = serde_yaml::from_str("maxUsers: 25").unwrap();
        assert_eq!(settings.max_users, 25);
        assert_eq!(settings.max_documents, 0);
        assert!(settings.ai_enabled);
        assert_eq!(settings.default_access_level, AccessLevel::Department);
    }

    #[test]
    fn test_scope_matches_tenant() {
        let tenant = Tenant::new("Acme", TenantSettings::default());
        assert_eq!(tenant.scope().tenant_id(), tenant.id);
    }
}
