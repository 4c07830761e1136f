//! Boolean permission queries over a [`PermissionSession`].
//!
//! Every query fails closed: unknown names, missing identity, missing role
//! assignment and gateway failures all answer `false`. `has_permission` is
//! driven by the grant table only; the super-admin bypass is applied by
//! callers such as [`super::PermissionGuard`].

use super::catalog::{Function, Module};
use super::resolution::Resolution;
use super::session::PermissionSession;

impl PermissionSession {
    /// Checks a grant by module display name and function slug.
    pub async fn has_permission(&self, module_name: &str, function_slug: &str) -> bool {
        let Ok(function) = function_slug.parse::<Function>() else {
            tracing::debug!(function = function_slug, "unknown function slug");
            return false;
        };
        self.check_named(module_name, function).await
    }

    /// Checks a grant for a catalog module and function.
    pub async fn has(&self, module: Module, function: Function) -> bool {
        let Resolution::Resolved(set) = self.load_user_permissions().await else {
            return false;
        };

        let catalog = match self.catalog.get(self.gateway.as_ref()).await {
            Ok(catalog) => catalog,
            Err(err) => {
                tracing::warn!(error = %err, "failed to resolve permission catalog");
                return false;
            }
        };

        let (Some(module_id), Some(function_id)) = (catalog.module_id(module), catalog.function_id(function)) else {
            tracing::debug!(module = %module, function = %function, "catalog entry missing");
            return false;
        };

        let granted = set.grants(module_id, function_id);
        tracing::debug!(
            user_id = %set.user_id,
            module = %module,
            function = %function,
            granted,
            "permission check"
        );
        granted
    }

    pub async fn can_read(&self, module_name: &str) -> bool {
        self.check_named(module_name, Function::Read).await
    }

    pub async fn can_create(&self, module_name: &str) -> bool {
        self.check_named(module_name, Function::Create).await
    }

    pub async fn can_update(&self, module_name: &str) -> bool {
        self.check_named(module_name, Function::Update).await
    }

    pub async fn can_delete(&self, module_name: &str) -> bool {
        self.check_named(module_name, Function::Delete).await
    }

    pub async fn can_report(&self, module_name: &str) -> bool {
        self.check_named(module_name, Function::Report).await
    }

    /// True iff the resolved profile code is `SUPER_ADMIN`, regardless of
    /// grants.
    pub async fn is_super_admin(&self) -> bool {
        self.load_user_permissions()
            .await
            .permissions()
            .is_some_and(|set| set.is_super_admin())
    }

    async fn check_named(&self, module_name: &str, function: Function) -> bool {
        let Ok(module) = module_name.parse::<Module>() else {
            tracing::debug!(module = module_name, "unknown module name");
            return false;
        };
        self.has(module, function).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::authz::catalog::LazyCatalog;
    use crate::authz::gateway::PermissionGateway;
    use crate::authz::identity::{AuthEvent, Identity};
    use crate::authz::testing::StubGateway;
    use crate::authz::SUPER_ADMIN;

    use super::*;

    async fn signed_in(gateway: &Arc<StubGateway>, user: Uuid) -> PermissionSession {
        let dyn_gateway: Arc<dyn PermissionGateway> = gateway.clone();
        let session = PermissionSession::new(dyn_gateway, Arc::new(LazyCatalog::new()));
        session.apply(AuthEvent::SignedIn(Identity::new(user, "user@igreja.org"))).await;
        session
    }

    #[tokio::test]
    async fn user_profile_with_single_read_grant() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        let profile = gateway.assign(user, "USUARIO");
        gateway.grant(profile, Module::Members, Function::Read);

        let session = signed_in(&gateway, user).await;
        assert!(session.can_read("Membros").await);
        assert!(!session.can_create("Membros").await);
        assert!(!session.can_read("Eventos").await);
        assert!(session.has_permission("Membros", "read").await);
        assert!(!session.is_super_admin().await);
    }

    #[tokio::test]
    async fn user_without_assignment_is_denied_everywhere() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let session = signed_in(&gateway, Uuid::new_v4()).await;

        assert!(!session.can_read("Membros").await);
        assert!(!session.can_create("Membros").await);
        assert!(!session.can_update("Eventos").await);
        assert!(!session.can_delete("Células").await);
        assert!(!session.can_report("Relatórios").await);
        assert!(!session.is_super_admin().await);
    }

    #[tokio::test]
    async fn super_admin_without_grants_is_not_auto_granted() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        gateway.assign(user, SUPER_ADMIN);

        let session = signed_in(&gateway, user).await;
        assert!(session.is_super_admin().await);
        assert!(!session.can_read("Membros").await);
        assert!(!session.has_permission("Perfis", "delete").await);
    }

    #[tokio::test]
    async fn unknown_names_deny() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        let profile = gateway.assign(user, "ADMIN");
        gateway.grant(profile, Module::Members, Function::Read);

        let session = signed_in(&gateway, user).await;
        assert!(!session.has_permission("Members", "read").await);
        assert!(!session.has_permission("Membros", "approve").await);
        assert!(!session.can_read("").await);
    }

    #[tokio::test]
    async fn module_missing_from_database_denies() {
        let gateway = Arc::new(StubGateway::new());
        gateway.add_function(Function::Read);
        gateway.add_module(Module::Members);
        let user = Uuid::new_v4();
        let profile = gateway.assign(user, "ADMIN");
        gateway.grant(profile, Module::Members, Function::Read);

        let session = signed_in(&gateway, user).await;
        assert!(session.can_read("Membros").await);
        assert!(!session.can_read("Eventos").await);
    }

    #[tokio::test]
    async fn repeated_checks_hit_the_cache() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        let profile = gateway.assign(user, "USUARIO");
        gateway.grant(profile, Module::Events, Function::Read);

        let session = signed_in(&gateway, user).await;
        for _ in 0..3 {
            assert!(session.can_read("Eventos").await);
            assert!(!session.can_delete("Eventos").await);
        }
        assert_eq!(gateway.role_lookups(), 1);
        assert_eq!(gateway.grant_lookups(), 1);

        session.clear_permissions_cache().await;
        assert!(session.can_read("Eventos").await);
        assert_eq!(gateway.role_lookups(), 2);
    }

    #[tokio::test]
    async fn catalog_failure_denies_then_recovers() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        let profile = gateway.assign(user, "USUARIO");
        gateway.grant(profile, Module::Notices, Function::Update);
        gateway.fail_catalog(true);

        let session = signed_in(&gateway, user).await;
        assert!(!session.can_update("Avisos").await);

        gateway.fail_catalog(false);
        assert!(session.can_update("Avisos").await);
    }
}
