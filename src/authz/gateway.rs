use async_trait::async_trait;
use uuid::Uuid;

/// Role assignment of a user, joined with the role's code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub profile_id: Uuid,
    pub profile_code: String,
}

/// One `(module, function)` pair granted to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Grant {
    pub module_id: Uuid,
    pub function_id: Uuid,
}

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed row: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// Read-only access to the relations the permission core depends on.
///
/// Every lookup is an equality filter; "no row" is `Ok(None)` / an empty
/// list, never an error.
#[async_trait]
pub trait PermissionGateway: Send + Sync {
    /// Role assignment for `user_id` (0 or 1 row).
    async fn find_role_assignment(&self, user_id: Uuid) -> Result<Option<RoleAssignment>, GatewayError>;

    /// All grants held by a profile (0..N rows).
    async fn list_grants(&self, profile_id: Uuid) -> Result<Vec<Grant>, GatewayError>;

    /// Id of the module named `name`.
    async fn find_module_id(&self, name: &str) -> Result<Option<Uuid>, GatewayError>;

    /// Id of the function whose slug is `slug`.
    async fn find_function_id(&self, slug: &str) -> Result<Option<Uuid>, GatewayError>;
}
