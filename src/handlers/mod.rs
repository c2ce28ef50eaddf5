// HTTP handlers and route builders

pub mod auth;
pub mod directory;
pub mod health;

use crate::app::AppState;
use axum::{
    routing::{get, post},
    Router,
};

// Authentication routes that need no token
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/verify", get(auth::verify_token))
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::detailed_health_check))
}

// Routes open to any authenticated role
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/roles", get(directory::list_roles))
}

// Routes restricted to user-management roles
pub fn user_management_routes() -> Router<AppState> {
    Router::new().route("/users", get(directory::list_users))
}
