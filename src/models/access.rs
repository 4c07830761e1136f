use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

fn parse_id(column: &str, value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value).map_err(|err| AppError::internal(format!("invalid uuid in {column}: {err}")))
}

// =============================================================================
// PROFILE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    pub id: Uuid,
    #[schema(example = "USUARIO")]
    pub code: String,
    pub description: String,
    pub active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProfile {
    pub id: String,
    pub code: String,
    pub description: String,
    pub status: bool,
}

impl TryFrom<DbProfile> for Profile {
    type Error = AppError;

    fn try_from(db: DbProfile) -> Result<Self, Self::Error> {
        Ok(Profile {
            id: parse_id("profiles.id", &db.id)?,
            code: db.code,
            description: db.description,
            active: db.status,
        })
    }
}

// =============================================================================
// USER-PROFILE ASSIGNMENT
// =============================================================================

/// The single profile a user holds.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileAssignment {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub profile_code: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProfileAssignment {
    pub user_id: String,
    pub profile_id: String,
    pub profile_code: String,
}

impl TryFrom<DbProfileAssignment> for ProfileAssignment {
    type Error = AppError;

    fn try_from(db: DbProfileAssignment) -> Result<Self, Self::Error> {
        Ok(ProfileAssignment {
            user_id: parse_id("user_profiles.user_id", &db.user_id)?,
            profile_id: parse_id("user_profiles.profile_id", &db.profile_id)?,
            profile_code: db.profile_code,
        })
    }
}

/// One `(module, function)` pair held by a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProfileGrant {
    #[schema(example = "Membros")]
    pub module: String,
    #[schema(example = "read")]
    pub function: String,
}

// =============================================================================
// MODULE CATALOG
// =============================================================================

/// A module together with the functions that apply to it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CatalogModule {
    pub id: Uuid,
    #[schema(example = "Membros")]
    pub name: String,
    pub description: Option<String>,
    pub order_index: i64,
    #[schema(example = json!(["read", "create", "update", "delete"]))]
    pub functions: Vec<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbModuleFunction {
    pub module_id: String,
    pub module_name: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub function_slug: Option<String>,
}
