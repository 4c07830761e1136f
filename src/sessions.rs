use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::authz::{AuthEvent, LazyCatalog, PermissionGateway, PermissionSession};
use crate::jwt::AuthUser;

struct Entry {
    session: Arc<PermissionSession>,
    /// Latest expiry among the tokens seen for the session.
    expires_at: AtomicI64,
}

/// One [`PermissionSession`] per authenticated session.
///
/// All sessions share the gateway and the resolved module catalog.
pub struct SessionStore {
    gateway: Arc<dyn PermissionGateway>,
    catalog: Arc<LazyCatalog>,
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionStore {
    pub fn new(gateway: Arc<dyn PermissionGateway>) -> Self {
        Self::with_catalog(gateway, Arc::new(LazyCatalog::new()))
    }

    pub fn with_catalog(gateway: Arc<dyn PermissionGateway>, catalog: Arc<LazyCatalog>) -> Self {
        Self {
            gateway,
            catalog,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<LazyCatalog> {
        &self.catalog
    }

    /// Resolves the catalog ahead of the first request. Failure is logged
    /// and retried on the first check.
    pub async fn warm_catalog(&self) {
        if let Err(err) = self.catalog.get(self.gateway.as_ref()).await {
            tracing::warn!(error = %err, "permission catalog not resolved at startup");
        }
    }

    /// Returns the session for `auth`, creating it on first sight. A token
    /// whose subject differs from the session's identity is an identity change.
    pub async fn attach(&self, auth: &AuthUser) -> Arc<PermissionSession> {
        let existing = {
            let sessions = self.sessions.read().await;
            sessions.get(&auth.session_id).map(|entry| {
                entry.expires_at.fetch_max(auth.expires_at, Ordering::Relaxed);
                Arc::clone(&entry.session)
            })
        };

        let session = match existing {
            Some(session) => session,
            None => {
                let mut sessions = self.sessions.write().await;
                let now = chrono::Utc::now().timestamp();
                let before = sessions.len();
                sessions.retain(|_, entry| entry.expires_at.load(Ordering::Relaxed) > now);
                if sessions.len() < before {
                    tracing::debug!(pruned = before - sessions.len(), "expired permission sessions pruned");
                }

                let entry = sessions.entry(auth.session_id).or_insert_with(|| Entry {
                    session: Arc::new(PermissionSession::new(Arc::clone(&self.gateway), Arc::clone(&self.catalog))),
                    expires_at: AtomicI64::new(auth.expires_at),
                });
                entry.expires_at.fetch_max(auth.expires_at, Ordering::Relaxed);
                Arc::clone(&entry.session)
            }
        };

        session.sync_identity(auth.identity()).await;
        session
    }

    /// Ends a session. Returns whether one existed.
    pub async fn sign_out(&self, session_id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&session_id);
        match removed {
            Some(entry) => {
                entry.session.apply(AuthEvent::SignedOut).await;
                tracing::info!(session_id = %session_id, "permission session closed");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
