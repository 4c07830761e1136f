//! Administrative reads and writes on the access-control tables.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::access::{
    CatalogModule, DbModuleFunction, DbProfile, DbProfileAssignment, Profile, ProfileAssignment, ProfileGrant,
};

pub async fn find_profile_by_code(pool: &SqlitePool, code: &str) -> AppResult<Option<Profile>> {
    let row = sqlx::query_as::<_, DbProfile>("SELECT id, code, description, status FROM profiles WHERE code = ?")
        .bind(code)
        .fetch_optional(pool)
        .await?;

    row.map(Profile::try_from).transpose()
}

pub async fn list_profiles(pool: &SqlitePool) -> AppResult<Vec<Profile>> {
    let rows = sqlx::query_as::<_, DbProfile>("SELECT id, code, description, status FROM profiles ORDER BY code")
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(Profile::try_from).collect()
}

pub async fn find_assignment(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<ProfileAssignment>> {
    let row = sqlx::query_as::<_, DbProfileAssignment>(
        "SELECT up.user_id AS user_id, up.profile_id AS profile_id, p.code AS profile_code \
         FROM user_profiles up JOIN profiles p ON p.id = up.profile_id \
         WHERE up.user_id = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(ProfileAssignment::try_from).transpose()
}

/// Gives `user_id` the profile `code`, replacing any previous assignment.
pub async fn assign_profile(pool: &SqlitePool, user_id: Uuid, code: &str) -> AppResult<ProfileAssignment> {
    let profile = find_profile_by_code(pool, code)
        .await?
        .ok_or_else(|| AppError::not_found(format!("profile {code} not found")))?;

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO user_profiles (id, user_id, profile_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET profile_id = excluded.profile_id, updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(profile.id.to_string())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!(user_id = %user_id, profile = %profile.code, "profile assigned");

    find_assignment(pool, user_id)
        .await?
        .ok_or_else(|| AppError::internal("assignment missing after upsert"))
}

/// Ids behind a `(profile, module, function)` triple and whether the
/// function applies to the module.
struct GrantTarget {
    profile_id: String,
    module_id: String,
    function_id: String,
    applies: bool,
}

async fn find_grant_target(
    pool: &SqlitePool,
    profile_code: &str,
    module_name: &str,
    function_slug: &str,
) -> AppResult<GrantTarget> {
    let row = sqlx::query_as::<_, (String, String, String, i64)>(
        "SELECT p.id, m.id, f.id, \
                EXISTS (SELECT 1 FROM module_functions mf WHERE mf.module_id = m.id AND mf.function_id = f.id) \
         FROM profiles p, modules m, functions f \
         WHERE p.code = ? AND m.name = ? AND f.slug = ?",
    )
    .bind(profile_code)
    .bind(module_name)
    .bind(function_slug)
    .fetch_optional(pool)
    .await?;

    let (profile_id, module_id, function_id, applies) = row.ok_or_else(|| {
        AppError::not_found(format!("no profile {profile_code}, module {module_name} or function {function_slug}"))
    })?;

    Ok(GrantTarget {
        profile_id,
        module_id,
        function_id,
        applies: applies != 0,
    })
}

/// Adds the `(profile, module, function)` grant. Re-granting is a no-op.
/// Only functions that apply to the module can be granted.
pub async fn grant(pool: &SqlitePool, profile_code: &str, module_name: &str, function_slug: &str) -> AppResult<()> {
    let target = find_grant_target(pool, profile_code, module_name, function_slug).await?;
    if !target.applies {
        return Err(AppError::bad_request(format!(
            "function {function_slug} does not apply to module {module_name}"
        )));
    }

    sqlx::query(
        "INSERT INTO profile_module_permissions (id, profile_id, module_id, function_id) VALUES (?, ?, ?, ?) \
         ON CONFLICT(profile_id, module_id, function_id) DO NOTHING",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&target.profile_id)
    .bind(&target.module_id)
    .bind(&target.function_id)
    .execute(pool)
    .await?;

    tracing::info!(profile = %profile_code, module = %module_name, function = %function_slug, "grant added");
    Ok(())
}

/// Removes a grant. Returns whether the profile held it.
pub async fn revoke(pool: &SqlitePool, profile_code: &str, module_name: &str, function_slug: &str) -> AppResult<bool> {
    let target = find_grant_target(pool, profile_code, module_name, function_slug).await?;

    let result = sqlx::query(
        "DELETE FROM profile_module_permissions WHERE profile_id = ? AND module_id = ? AND function_id = ?",
    )
    .bind(&target.profile_id)
    .bind(&target.module_id)
    .bind(&target.function_id)
    .execute(pool)
    .await?;

    let removed = result.rows_affected() > 0;
    if removed {
        tracing::info!(profile = %profile_code, module = %module_name, function = %function_slug, "grant revoked");
    }
    Ok(removed)
}

/// Grants held by a profile, in module display order.
pub async fn list_profile_grants(pool: &SqlitePool, profile_code: &str) -> AppResult<Vec<ProfileGrant>> {
    let profile = find_profile_by_code(pool, profile_code)
        .await?
        .ok_or_else(|| AppError::not_found(format!("profile {profile_code} not found")))?;

    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT m.name, f.slug \
         FROM profile_module_permissions pmp \
         JOIN modules m ON m.id = pmp.module_id \
         JOIN functions f ON f.id = pmp.function_id \
         WHERE pmp.profile_id = ? \
         ORDER BY m.order_index, m.name, f.rowid",
    )
    .bind(profile.id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(module, function)| ProfileGrant { module, function })
        .collect())
}

/// Removes the user's profile. Returns whether they had one.
pub async fn unassign_profile(pool: &SqlitePool, user_id: Uuid) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM user_profiles WHERE user_id = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await?;

    let removed = result.rows_affected() > 0;
    if removed {
        tracing::info!(user_id = %user_id, "profile unassigned");
    }
    Ok(removed)
}

/// Modules in display order with the functions that apply to each.
pub async fn list_catalog(pool: &SqlitePool) -> AppResult<Vec<CatalogModule>> {
    let rows = sqlx::query_as::<_, DbModuleFunction>(
        "SELECT m.id AS module_id, m.name AS module_name, m.description AS description, \
                m.order_index AS order_index, f.slug AS function_slug \
         FROM modules m \
         LEFT JOIN module_functions mf ON mf.module_id = m.id \
         LEFT JOIN functions f ON f.id = mf.function_id \
         ORDER BY m.order_index, m.name, f.rowid",
    )
    .fetch_all(pool)
    .await?;

    let mut modules: Vec<CatalogModule> = Vec::new();
    for row in rows {
        let id = Uuid::parse_str(&row.module_id)
            .map_err(|err| AppError::internal(format!("invalid uuid in modules.id: {err}")))?;

        match modules.last_mut() {
            Some(module) if module.id == id => {
                if let Some(slug) = row.function_slug {
                    module.functions.push(slug);
                }
            }
            _ => modules.push(CatalogModule {
                id,
                name: row.module_name,
                description: row.description,
                order_index: row.order_index,
                functions: row.function_slug.into_iter().collect(),
            }),
        }
    }

    Ok(modules)
}
