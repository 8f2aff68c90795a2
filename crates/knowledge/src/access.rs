//! Access policy: effective privileges and document visibility.
//!
//! Privileges gate actions; a document's access level gates visibility.
//! The two are independent except for org admins, who get every privilege
//! and see every document of their own tenant.

use crate::tenant::{Privilege, Tenant, User};
use crate::types::{AccessLevel, Document};
use kbase_core::{AppError, AppResult};
use std::collections::BTreeSet;

/// Generic denial message; never names the resource.
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action";

/// Whether the user bypasses visibility filtering.
pub fn is_admin_equivalent(user: &User) -> bool {
    user.is_org_admin
}

/// Compute the user's effective privilege set.
///
/// Org admins get every privilege. Everyone else gets the union of their
/// role's privileges and their direct grants; an unknown role contributes
/// nothing.
pub fn effective_privileges(user: &User, tenant: &Tenant) -> BTreeSet<Privilege> {
    if is_admin_equivalent(user) {
        return Privilege::all();
    }

    let mut privileges = match tenant.role(&user.org_role) {
        Some(role) => role.privileges.clone(),
        None => {
            tracing::debug!(
                "User {} has unknown role '{}' in tenant {}",
                user.id,
                user.org_role,
                tenant.id
            );
            BTreeSet::new()
        }
    };

    privileges.extend(user.direct_privileges.iter().copied());
    privileges
}

/// Fail with a generic permission error unless the user holds `privilege`.
pub fn require_privilege(user: &User, tenant: &Tenant, privilege: Privilege) -> AppResult<()> {
    if effective_privileges(user, tenant).contains(&privilege) {
        Ok(())
    } else {
        tracing::info!("Denied {} to user {}", privilege, user.id);
        Err(AppError::Permission(PERMISSION_DENIED.to_string()))
    }
}

/// Whether the user may see the document.
pub fn can_view(user: &User, document: &Document) -> bool {
    if document.tenant_id != user.tenant_id {
        return false;
    }

    VisibilityFilter::for_user(user).allows(
        document.access_level,
        document.department.as_deref(),
        &document.uploaded_by,
    )
}

/// Document-level visibility rule for one caller.
///
/// Storage backends translate this into their own query language so the
/// rule is applied before ranking, not after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityFilter {
    /// Org admins see everything in their tenant.
    Unrestricted,
    /// Public, same-department, or own private documents.
    Restricted {
        user_id: String,
        department: Option<String>,
    },
}

impl VisibilityFilter {
    pub fn for_user(user: &User) -> Self {
        if is_admin_equivalent(user) {
            Self::Unrestricted
        } else {
            Self::Restricted {
                user_id: user.id.clone(),
                department: user.department.clone(),
            }
        }
    }

    pub fn allows(
        &self,
        access_level: AccessLevel,
        department: Option<&str>,
        uploaded_by: &str,
    ) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Restricted {
                user_id,
                department: user_department,
            } => match access_level {
                AccessLevel::Public => true,
                AccessLevel::Department => match (department, user_department.as_deref()) {
                    (Some(doc_dept), Some(user_dept)) => doc_dept == user_dept,
                    _ => false,
                },
                AccessLevel::Private => uploaded_by == user_id,
            },
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }
}
