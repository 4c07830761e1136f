use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::SqlitePermissionGateway;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, permissions};
use crate::sessions::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig) -> Self {
        let gateway = Arc::new(SqlitePermissionGateway::new(pool.clone()));
        Self {
            pool,
            jwt: Arc::new(jwt),
            sessions: Arc::new(SessionStore::new(gateway)),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    create_app_with(AppState::new(pool, jwt_config)).await
}

pub async fn create_app_with(state: AppState) -> Result<Router, AppError> {
    state.sessions.warm_catalog().await;

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let permission_routes = Router::new()
        .route("/:module", get(permissions::module_access))
        .route("/:module/:action", get(permissions::check_action));

    let api = Router::new()
        .route("/health", get(health::health))
        .route("/me", get(permissions::me))
        .route("/auth/logout", post(auth::logout))
        .nest("/permissions", permission_routes);

    let router = Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
