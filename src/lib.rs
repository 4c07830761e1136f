pub mod app;
pub mod authz;
pub mod db;
pub mod docs;
pub mod errors;
pub mod jwt;
pub mod models;
pub mod routes;
pub mod sessions;

// Re-export commonly used items for tests
pub use app::{create_app, create_app_with, AppState};
