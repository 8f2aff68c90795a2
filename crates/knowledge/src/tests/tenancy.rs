//! Tests for tenant setup, registration and privilege checks.

#[cfg(test)]
mod tests {
    use crate::service::{Caller, KnowledgeService};
    use crate::store::SqliteStore;
    use crate::tenant::{NewUser, Privilege, Role, TenantSettings};
    use crate::types::{AccessLevel, DocumentStatus, NewDocument, UploadedFile};
    use crate::KnowledgeConfig;
    use kbase_core::AppError;
    use kbase_llm::{ModelChain, ScriptedClient};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn service() -> KnowledgeService {
        KnowledgeService::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(ScriptedClient::new().respond_always("ok")),
            ModelChain::new("primary", &[]),
            KnowledgeConfig::default(),
            None,
        )
        .unwrap()
    }

    fn new_user(name: &str, role: Option<&str>) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name),
            department: Some("sales".to_string()),
            org_role: role.map(str::to_string),
            ..Default::default()
        }
    }

    /// Tenant with a bootstrapped admin.
    fn bootstrap(service: &KnowledgeService, settings: TenantSettings) -> Caller {
        let tenant = service.create_tenant("Acme", settings).unwrap();
        let admin = service
            .register_user(
                &tenant.id,
                NewUser {
                    is_org_admin: true,
                    ..new_user("admin", Some("admin"))
                },
                None,
            )
            .unwrap();
        Caller::new(tenant.id, admin.id)
    }

    #[test]
    fn test_first_user_bootstraps_without_self_registration() {
        let service = service();
        let admin = bootstrap(&service, TenantSettings::default());

        let user = service.get_user(&admin).unwrap();
        assert!(user.is_org_admin);
        assert_eq!(service.get_tenant(&admin.tenant_id).unwrap().user_count, 1);

        let err = service
            .register_user(&admin.tenant_id, new_user("walkin", None), None)
            .unwrap_err();
        assert!(matches!(err, AppError::Permission(_)));
    }

    #[test]
    fn test_self_registration_cannot_claim_admin() {
        let service = service();
        let settings = TenantSettings {
            allow_self_registration: true,
            ..Default::default()
        };
        let admin = bootstrap(&service, settings);

        let user = service
            .register_user(
                &admin.tenant_id,
                NewUser {
                    is_org_admin: true,
                    direct_privileges: BTreeSet::from([Privilege::ManageRoles]),
                    ..new_user("walkin", None)
                },
                None,
            )
            .unwrap();

        assert!(!user.is_org_admin);
        assert!(user.direct_privileges.is_empty());
        assert_eq!(user.org_role, "employee");
    }

    #[test]
    fn test_only_admins_create_admins() {
        let service = service();
        let admin = bootstrap(&service, TenantSettings::default());

        let manager = service
            .register_user(
                &admin.tenant_id,
                NewUser {
                    direct_privileges: BTreeSet::from([Privilege::ManageUsers]),
                    ..new_user("manager", None)
                },
                Some(&admin),
            )
            .unwrap();
        let manager = Caller::new(admin.tenant_id.clone(), manager.id);

        assert!(service
            .register_user(&admin.tenant_id, new_user("clerk", Some("viewer")), Some(&manager))
            .is_ok());

        let err = service
            .register_user(
                &admin.tenant_id,
                NewUser {
                    is_org_admin: true,
                    ..new_user("usurper", None)
                },
                Some(&manager),
            )
            .unwrap_err();
        assert!(matches!(err, AppError::Permission(_)));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let service = service();
        let admin = bootstrap(&service, TenantSettings::default());

        let err = service
            .register_user(&admin.tenant_id, new_user("x", Some("wizard")), Some(&admin))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_user_limit_counts_bootstrap_admin() {
        let service = service();
        let admin = bootstrap(
            &service,
            TenantSettings {
                max_users: 2,
                ..Default::default()
            },
        );

        service
            .register_user(&admin.tenant_id, new_user("second", None), Some(&admin))
            .unwrap();
        let err = service
            .register_user(&admin.tenant_id, new_user("third", None), Some(&admin))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Validation error: User limit reached for this organization"
        );
    }

    #[test]
    fn test_admin_with_unknown_role_has_every_privilege() {
        let service = service();
        let tenant = service
            .create_tenant("Acme", TenantSettings::default())
            .unwrap();
        let admin = service
            .register_user(
                &tenant.id,
                NewUser {
                    is_org_admin: true,
                    ..new_user("boss", None)
                },
                None,
            )
            .unwrap();

        let caller = Caller::new(tenant.id.clone(), admin.id);
        let mut roles = tenant.roles.clone();
        roles.push(Role::new("intern", "Intern", Vec::<Privilege>::new()));
        service.replace_roles(&caller, roles).unwrap();

        let intern = service
            .register_user(
                &tenant.id,
                NewUser {
                    is_org_admin: true,
                    ..new_user("intern", Some("intern"))
                },
                Some(&caller),
            )
            .unwrap();

        let privileges = service
            .effective_privileges(&Caller::new(tenant.id, intern.id))
            .unwrap();
        assert_eq!(privileges, Privilege::all());
    }

    #[test]
    fn test_role_management_needs_privilege() {
        let service = service();
        let admin = bootstrap(&service, TenantSettings::default());
        let employee = service
            .register_user(&admin.tenant_id, new_user("emp", None), Some(&admin))
            .unwrap();
        let employee = Caller::new(admin.tenant_id.clone(), employee.id);

        let roles = service.get_tenant(&admin.tenant_id).unwrap().roles;
        let err = service.replace_roles(&employee, roles).unwrap_err();
        assert!(matches!(err, AppError::Permission(_)));

        let err = service.list_users(&employee).unwrap_err();
        assert!(matches!(err, AppError::Permission(_)));
        assert_eq!(service.list_users(&admin).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_tenant_context() {
        let service = service();
        let err = service
            .effective_privileges(&Caller::new("  ", "someone"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Missing tenant context");

        let err = service
            .effective_privileges(&Caller::new("nope", "someone"))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_callers_cannot_cross_tenants() {
        let service = service();
        let acme = bootstrap(&service, TenantSettings::default());
        let globex = bootstrap(&service, TenantSettings::default());

        let err = service
            .get_user(&Caller::new(globex.tenant_id.clone(), acme.user_id.clone()))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = service
            .register_user(&globex.tenant_id, new_user("spy", None), Some(&acme))
            .unwrap_err();
        assert!(matches!(err, AppError::Permission(_)));
    }

    #[tokio::test]
    async fn test_document_status_hidden_from_other_tenant() {
        let service = service();
        let acme = bootstrap(&service, TenantSettings::default());
        let globex = bootstrap(&service, TenantSettings::default());

        let (document, handle) = service
            .upload_document(
                &acme,
                UploadedFile::new("plan.txt", b"Quarterly plan for the sales team.".to_vec()),
                NewDocument {
                    access_level: Some(AccessLevel::Public),
                    ..NewDocument::titled("Plan")
                },
            )
            .await
            .unwrap();
        assert_eq!(handle.wait().await.unwrap(), DocumentStatus::Active);

        let report = service.get_document_status(&acme, &document.id).unwrap();
        assert_eq!(report.status, DocumentStatus::Active);

        let err = service
            .get_document_status(&globex, &document.id)
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
