use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, RwLock};
use uuid::Uuid;

use super::cache::PermissionCache;
use super::catalog::LazyCatalog;
use super::gateway::PermissionGateway;
use super::identity::{AuthEvent, Identity};
use super::resolution::{DenyReason, ResolvedPermissions, Resolution};

#[derive(Debug, Default)]
struct IdentityState {
    current: Option<Identity>,
    /// Bumped on every identity change or explicit clear. A resolution is
    /// only committed if the generation it started under is still current.
    generation: u64,
}

struct InFlight {
    generation: u64,
    result: Arc<OnceCell<Resolution>>,
}

/// Permission state scoped to one authenticated session.
///
/// Holds the session's identity, the single-entry permission cache and the
/// pending resolution concurrent checks join instead of fetching again.
pub struct PermissionSession {
    pub(super) gateway: Arc<dyn PermissionGateway>,
    pub(super) catalog: Arc<LazyCatalog>,
    identity: RwLock<IdentityState>,
    cache: PermissionCache,
    in_flight: Mutex<Option<InFlight>>,
}

impl PermissionSession {
    pub fn new(gateway: Arc<dyn PermissionGateway>, catalog: Arc<LazyCatalog>) -> Self {
        Self {
            gateway,
            catalog,
            identity: RwLock::new(IdentityState::default()),
            cache: PermissionCache::new(),
            in_flight: Mutex::new(None),
        }
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.identity.read().await.current.clone()
    }

    /// Applies an auth state change and invalidates cached permissions.
    pub async fn apply(&self, event: AuthEvent) {
        let mut state = self.identity.write().await;
        self.apply_locked(&mut state, event).await;
    }

    /// Signs `identity` in unless it is already the session's user.
    pub async fn sync_identity(&self, identity: Identity) {
        {
            let state = self.identity.read().await;
            if state.current.as_ref() == Some(&identity) {
                return;
            }
        }

        // Another request may have signed the same identity in the meantime.
        let mut state = self.identity.write().await;
        if state.current.as_ref() == Some(&identity) {
            return;
        }
        self.apply_locked(&mut state, AuthEvent::SignedIn(identity)).await;
    }

    async fn apply_locked(&self, state: &mut IdentityState, event: AuthEvent) {
        let previous = state.current.as_ref().map(|identity| identity.user_id);
        state.current = event.identity().cloned();
        self.invalidate(state).await;

        tracing::debug!(
            event = event.name(),
            previous_user = ?previous,
            user_id = ?state.current.as_ref().map(|identity| identity.user_id),
            "auth state changed"
        );
    }

    /// Drops the cached set so the next check resolves again.
    pub async fn clear_permissions_cache(&self) {
        let mut state = self.identity.write().await;
        self.invalidate(&mut state).await;
    }

    async fn invalidate(&self, state: &mut IdentityState) {
        state.generation += 1;
        self.cache.clear().await;
        self.in_flight.lock().await.take();
    }

    /// Resolves the current user's permissions, reusing the cached set when
    /// it belongs to the same user.
    pub async fn load_user_permissions(&self) -> Resolution {
        let (user_id, generation) = {
            let state = self.identity.read().await;
            match &state.current {
                Some(identity) => (identity.user_id, state.generation),
                None => return Resolution::Denied(DenyReason::Unauthenticated),
            }
        };

        if let Some(cached) = self.cache.get().await {
            if cached.user_id == user_id {
                return Resolution::Resolved(cached);
            }
        }

        let pending = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(flight) if flight.generation == generation => Arc::clone(&flight.result),
                _ => {
                    let result = Arc::new(OnceCell::new());
                    *slot = Some(InFlight {
                        generation,
                        result: Arc::clone(&result),
                    });
                    result
                }
            }
        };

        let resolution = pending.get_or_init(|| self.fetch(user_id)).await.clone();
        let resolution = self.commit(generation, resolution).await;

        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|flight| Arc::ptr_eq(&flight.result, &pending)) {
            slot.take();
        }

        resolution
    }

    async fn fetch(&self, user_id: Uuid) -> Resolution {
        let assignment = match self.gateway.find_role_assignment(user_id).await {
            Ok(Some(assignment)) => assignment,
            Ok(None) => {
                tracing::debug!(user_id = %user_id, "no role assignment");
                return Resolution::Denied(DenyReason::NoRoleAssignment);
            }
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "failed to load role assignment");
                return Resolution::Denied(DenyReason::LookupFailed);
            }
        };

        let grants = match self.gateway.list_grants(assignment.profile_id).await {
            Ok(grants) => grants,
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    profile_id = %assignment.profile_id,
                    error = %err,
                    "failed to load profile grants"
                );
                return Resolution::Denied(DenyReason::LookupFailed);
            }
        };

        tracing::debug!(
            user_id = %user_id,
            profile = %assignment.profile_code,
            grants = grants.len(),
            "permissions resolved"
        );

        Resolution::Resolved(Arc::new(ResolvedPermissions::from_grants(
            user_id,
            assignment.profile_code,
            grants,
        )))
    }

    async fn commit(&self, generation: u64, resolution: Resolution) -> Resolution {
        let state = self.identity.read().await;
        if state.generation != generation {
            tracing::debug!(generation, current = state.generation, "discarding stale resolution");
            return Resolution::Denied(DenyReason::IdentityChanged);
        }

        if let Resolution::Resolved(set) = &resolution {
            self.cache.set(Arc::clone(set)).await;
        }
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::catalog::{Function, Module};
    use crate::authz::testing::StubGateway;

    fn session(gateway: &Arc<StubGateway>) -> Arc<PermissionSession> {
        let gateway: Arc<dyn PermissionGateway> = gateway.clone();
        Arc::new(PermissionSession::new(gateway, Arc::new(LazyCatalog::new())))
    }

    #[tokio::test]
    async fn unauthenticated_session_is_denied_without_lookups() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let session = session(&gateway);

        let resolution = session.load_user_permissions().await;
        assert_eq!(resolution.deny_reason(), Some(DenyReason::Unauthenticated));
        assert_eq!(gateway.role_lookups(), 0);
    }

    #[tokio::test]
    async fn missing_assignment_is_denied_and_not_cached() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let session = session(&gateway);
        session.apply(AuthEvent::SignedIn(Identity::new(Uuid::new_v4(), "a@igreja.org"))).await;

        for _ in 0..2 {
            let resolution = session.load_user_permissions().await;
            assert_eq!(resolution.deny_reason(), Some(DenyReason::NoRoleAssignment));
        }
        assert_eq!(gateway.role_lookups(), 2);
        assert_eq!(gateway.grant_lookups(), 0);
    }

    #[tokio::test]
    async fn resolved_set_is_cached_per_user() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        let profile = gateway.assign(user, "USUARIO");
        gateway.grant(profile, Module::Members, Function::Read);

        let session = session(&gateway);
        session.apply(AuthEvent::SignedIn(Identity::new(user, "u@igreja.org"))).await;

        let first = session.load_user_permissions().await;
        let second = session.load_user_permissions().await;
        let set = first.permissions().expect("resolved");
        assert_eq!(set.profile_code, "USUARIO");
        assert_eq!(set.user_id, user);
        assert!(second.permissions().is_some());
        assert_eq!(gateway.role_lookups(), 1);
        assert_eq!(gateway.grant_lookups(), 1);
    }

    #[tokio::test]
    async fn lookup_failure_fails_closed_and_retries_next_call() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        gateway.assign(user, "ADMIN");
        gateway.fail_roles(true);

        let session = session(&gateway);
        session.apply(AuthEvent::SignedIn(Identity::new(user, "a@igreja.org"))).await;

        let resolution = session.load_user_permissions().await;
        assert_eq!(resolution.deny_reason(), Some(DenyReason::LookupFailed));

        gateway.fail_roles(false);
        let resolution = session.load_user_permissions().await;
        assert_eq!(resolution.permissions().map(|set| set.profile_code.as_str()), Some("ADMIN"));
        assert_eq!(gateway.role_lookups(), 2);
    }

    #[tokio::test]
    async fn grant_lookup_failure_fails_closed_and_is_not_cached() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        let profile = gateway.assign(user, "MODERADOR");
        gateway.grant(profile, Module::Cells, Function::Read);
        gateway.fail_grants(true);

        let session = session(&gateway);
        session.apply(AuthEvent::SignedIn(Identity::new(user, "m@igreja.org"))).await;

        let resolution = session.load_user_permissions().await;
        assert_eq!(resolution.deny_reason(), Some(DenyReason::LookupFailed));
        assert!(session.cache.get().await.is_none());
        assert!(!session.can_read("Células").await);
        assert!(!session.can_create("Células").await);
        assert!(!session.can_update("Células").await);
        assert!(!session.can_delete("Células").await);
        assert!(!session.can_report("Relatórios").await);
        assert!(!session.is_super_admin().await);

        gateway.fail_grants(false);
        let resolution = session.load_user_permissions().await;
        assert_eq!(resolution.permissions().map(|set| set.profile_code.as_str()), Some("MODERADOR"));
        assert!(session.can_read("Células").await);
        assert!(session.cache.get().await.is_some());
    }

    #[tokio::test]
    async fn concurrent_checks_share_one_resolution() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        gateway.assign(user, "USUARIO");
        gateway.gate(true);

        let session = session(&gateway);
        session.apply(AuthEvent::SignedIn(Identity::new(user, "u@igreja.org"))).await;

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                tokio::spawn(async move { session.load_user_permissions().await })
            })
            .collect();

        gateway.entered.notified().await;
        gateway.release.notify_one();

        for task in tasks {
            let resolution = task.await.expect("join");
            assert!(resolution.permissions().is_some());
        }
        assert_eq!(gateway.role_lookups(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_for_one_identity_all_resolve() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        gateway.assign(user, "USUARIO");

        let session = session(&gateway);
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    session.sync_identity(Identity::new(user, "u@igreja.org")).await;
                    session.load_user_permissions().await
                })
            })
            .collect();

        for task in tasks {
            let resolution = task.await.expect("join");
            assert_eq!(resolution.deny_reason(), None);
        }
        assert_eq!(session.identity.read().await.generation, 1);
    }

    #[tokio::test]
    async fn sign_out_discards_resolution_in_flight() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        gateway.assign(user, "SUPER_ADMIN");
        gateway.gate(true);

        let session = session(&gateway);
        session.apply(AuthEvent::SignedIn(Identity::new(user, "root@igreja.org"))).await;

        let task = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.load_user_permissions().await })
        };

        gateway.entered.notified().await;
        session.apply(AuthEvent::SignedOut).await;
        gateway.release.notify_one();

        let resolution = task.await.expect("join");
        assert_eq!(resolution.deny_reason(), Some(DenyReason::IdentityChanged));
        assert!(session.cache.get().await.is_none());

        gateway.gate(false);
        let resolution = session.load_user_permissions().await;
        assert_eq!(resolution.deny_reason(), Some(DenyReason::Unauthenticated));
    }

    #[tokio::test]
    async fn identity_change_resolves_the_new_user() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        gateway.assign(first, "ADMIN");
        gateway.assign(second, "USUARIO");

        let session = session(&gateway);
        session.sync_identity(Identity::new(first, "one@igreja.org")).await;
        let resolution = session.load_user_permissions().await;
        assert_eq!(resolution.permissions().map(|set| set.user_id), Some(first));

        session.sync_identity(Identity::new(first, "one@igreja.org")).await;
        session.load_user_permissions().await;
        assert_eq!(gateway.role_lookups(), 1);

        session.sync_identity(Identity::new(second, "two@igreja.org")).await;
        let resolution = session.load_user_permissions().await;
        assert_eq!(resolution.permissions().map(|set| set.profile_code.as_str()), Some("USUARIO"));
        assert_eq!(gateway.role_lookups(), 2);
    }

    #[tokio::test]
    async fn token_refresh_clears_cache() {
        let gateway = Arc::new(StubGateway::with_full_catalog());
        let user = Uuid::new_v4();
        gateway.assign(user, "ADMIN");

        let session = session(&gateway);
        let identity = Identity::new(user, "a@igreja.org");
        session.apply(AuthEvent::SignedIn(identity.clone())).await;
        session.load_user_permissions().await;

        session.apply(AuthEvent::TokenRefreshed(identity)).await;
        session.load_user_permissions().await;
        assert_eq!(gateway.role_lookups(), 2);
    }
}
