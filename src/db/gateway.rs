use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::authz::{GatewayError, Grant, PermissionGateway, RoleAssignment};

/// [`PermissionGateway`] over the SQLite access-control tables.
#[derive(Debug, Clone)]
pub struct SqlitePermissionGateway {
    pool: SqlitePool,
}

impl SqlitePermissionGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_id(column: &str, value: &str) -> Result<Uuid, GatewayError> {
    Uuid::parse_str(value).map_err(|err| GatewayError::malformed(format!("{column}: {err}")))
}

#[async_trait]
impl PermissionGateway for SqlitePermissionGateway {
    async fn find_role_assignment(&self, user_id: Uuid) -> Result<Option<RoleAssignment>, GatewayError> {
        let row = sqlx::query(
            "SELECT up.profile_id AS profile_id, COALESCE(p.code, '') AS code \
             FROM user_profiles up LEFT JOIN profiles p ON p.id = up.profile_id \
             WHERE up.user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let profile_id: String = row.try_get("profile_id")?;
        Ok(Some(RoleAssignment {
            profile_id: parse_id("user_profiles.profile_id", &profile_id)?,
            profile_code: row.try_get("code")?,
        }))
    }

    async fn list_grants(&self, profile_id: Uuid) -> Result<Vec<Grant>, GatewayError> {
        let rows = sqlx::query("SELECT module_id, function_id FROM profile_module_permissions WHERE profile_id = ?")
            .bind(profile_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Grant, GatewayError> {
                let module_id: String = row.try_get("module_id")?;
                let function_id: String = row.try_get("function_id")?;
                Ok(Grant {
                    module_id: parse_id("profile_module_permissions.module_id", &module_id)?,
                    function_id: parse_id("profile_module_permissions.function_id", &function_id)?,
                })
            })
            .collect()
    }

    async fn find_module_id(&self, name: &str) -> Result<Option<Uuid>, GatewayError> {
        let id = sqlx::query_scalar::<_, String>("SELECT id FROM modules WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        id.map(|id| parse_id("modules.id", &id)).transpose()
    }

    async fn find_function_id(&self, slug: &str) -> Result<Option<Uuid>, GatewayError> {
        let id = sqlx::query_scalar::<_, String>("SELECT id FROM functions WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        id.map(|id| parse_id("functions.id", &id)).transpose()
    }
}
