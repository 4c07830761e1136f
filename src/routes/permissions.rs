use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{DenyReason, Function, GuardDecision, ModuleAccess, PermissionGuard, Resolution};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    Denied,
}

/// The caller and what their permissions resolved to.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: Uuid,
    #[schema(example = "ana@igreja.org")]
    pub email: String,
    pub status: ResolutionStatus,
    pub deny_reason: Option<DenyReason>,
    #[schema(example = "USUARIO")]
    pub profile_code: Option<String>,
    pub is_super_admin: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GuardQuery {
    /// Let super-admins through regardless of grants. Defaults to true.
    pub allow_super_admin: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GuardResponse {
    #[schema(example = "Membros")]
    pub module: String,
    pub action: Function,
    pub allowed: bool,
    pub decision: GuardDecision,
}

#[utoipa::path(
    get,
    path = "/api/me",
    tag = "Permissions",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Caller identity and resolved profile", body = MeResponse),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<MeResponse>> {
    let session = state.sessions.attach(&auth).await;

    let response = match session.load_user_permissions().await {
        Resolution::Resolved(set) => MeResponse {
            user_id: auth.user_id,
            email: auth.email,
            status: ResolutionStatus::Resolved,
            deny_reason: None,
            is_super_admin: set.is_super_admin(),
            profile_code: Some(set.profile_code.clone()),
        },
        Resolution::Denied(reason) => MeResponse {
            user_id: auth.user_id,
            email: auth.email,
            status: ResolutionStatus::Denied,
            deny_reason: Some(reason),
            profile_code: None,
            is_super_admin: false,
        },
    };

    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/permissions/{module}",
    tag = "Permissions",
    security(("bearerAuth" = [])),
    params(("module" = String, Path, description = "Module display name", example = "Membros")),
    responses(
        (status = 200, description = "Flags for every function on the module", body = ModuleAccess),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
pub async fn module_access(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(module): Path<String>,
) -> AppResult<Json<ModuleAccess>> {
    let session = state.sessions.attach(&auth).await;
    let access = ModuleAccess::load(&session, &module).await;
    Ok(Json(access))
}

#[utoipa::path(
    get,
    path = "/api/permissions/{module}/{action}",
    tag = "Permissions",
    security(("bearerAuth" = [])),
    params(
        ("module" = String, Path, description = "Module display name", example = "Membros"),
        ("action" = String, Path, description = "Function slug", example = "read"),
        GuardQuery
    ),
    responses(
        (status = 200, description = "Guard decision", body = GuardResponse),
        (status = 400, description = "Unknown action"),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
pub async fn check_action(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((module, action)): Path<(String, String)>,
    Query(query): Query<GuardQuery>,
) -> AppResult<Json<GuardResponse>> {
    let function: Function = action
        .parse()
        .map_err(|_| AppError::bad_request(format!("unknown action {action}")))?;

    let session = state.sessions.attach(&auth).await;
    let guard = PermissionGuard::new(module.as_str(), function).allow_super_admin(query.allow_super_admin.unwrap_or(true));
    let decision = guard.check(&session).await;

    tracing::debug!(user_id = %auth.user_id, module = %module, function = %function, ?decision, "guard evaluated");

    Ok(Json(GuardResponse {
        module,
        action: function,
        allowed: decision.is_allowed(),
        decision,
    }))
}
