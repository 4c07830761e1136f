use std::sync::Arc;

use tokio::sync::RwLock;

use super::resolution::ResolvedPermissions;

/// Single-entry cache for the session's resolved permission set.
///
/// No expiry; the owning session clears it on identity change.
#[derive(Debug, Default)]
pub struct PermissionCache {
    entry: RwLock<Option<Arc<ResolvedPermissions>>>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<Arc<ResolvedPermissions>> {
        self.entry.read().await.clone()
    }

    pub async fn set(&self, permissions: Arc<ResolvedPermissions>) {
        *self.entry.write().await = Some(permissions);
    }

    pub async fn clear(&self) {
        self.entry.write().await.take();
    }
}
