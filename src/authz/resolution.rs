use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::gateway::Grant;
use super::SUPER_ADMIN;

/// Permission set resolved for one user: module id -> granted function ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPermissions {
    pub user_id: Uuid,
    pub profile_code: String,
    pub permissions: HashMap<Uuid, HashSet<Uuid>>,
}

impl ResolvedPermissions {
    pub fn from_grants(user_id: Uuid, profile_code: impl Into<String>, grants: impl IntoIterator<Item = Grant>) -> Self {
        let mut permissions: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        for grant in grants {
            permissions.entry(grant.module_id).or_default().insert(grant.function_id);
        }

        Self {
            user_id,
            profile_code: profile_code.into(),
            permissions,
        }
    }

    pub fn grants(&self, module_id: Uuid, function_id: Uuid) -> bool {
        self.permissions
            .get(&module_id)
            .is_some_and(|functions| functions.contains(&function_id))
    }

    pub fn is_super_admin(&self) -> bool {
        self.profile_code == SUPER_ADMIN
    }
}

/// Why a resolution ended in denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// No authenticated identity on the session.
    Unauthenticated,
    /// The user has no role assignment.
    NoRoleAssignment,
    /// A gateway lookup failed.
    LookupFailed,
    /// The identity changed while the resolution was in flight.
    IdentityChanged,
}

/// Outcome of resolving the current user's permissions.
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(Arc<ResolvedPermissions>),
    Denied(DenyReason),
}

impl Resolution {
    pub fn permissions(&self) -> Option<&ResolvedPermissions> {
        match self {
            Resolution::Resolved(set) => Some(set),
            Resolution::Denied(_) => None,
        }
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Resolution::Resolved(_) => None,
            Resolution::Denied(reason) => Some(*reason),
        }
    }
}
