use axum::extract::State;
use axum::http::StatusCode;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::jwt::AuthUser;

/// Sign-out notification from the portal. Drops the caller's permission
/// session so the next sign-in resolves from scratch.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 204, description = "Permission session cleared"),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> AppResult<StatusCode> {
    if !state.sessions.sign_out(auth.session_id).await {
        tracing::debug!(user_id = %auth.user_id, "logout without an active permission session");
    }

    Ok(StatusCode::NO_CONTENT)
}
