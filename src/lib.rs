// Library exports for the hospital access core
// Exposes the components and a router builder for the server binary and tests

pub mod app;
pub mod app_config;
pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::{AppState, InitError};
pub use app_config::{AppConfig, ConfigError, StoreBackend};
pub use config::{FailurePolicy, PermissionConfig, RateLimitRule, RateLimitingConfig};
pub use db::{
    InMemoryPrincipalRepository, KeyValueStore, MemoryStore, PrincipalRepository, RedisConfig,
    RedisPool, SharedStore, StoreError,
};
pub use middleware::{AccessGuard, AuthenticatedUser, GuardError};
pub use models::auth::SessionClaims;
pub use models::principal::{Principal, Role, RoleSet};
pub use services::{
    CredentialError, CredentialVerifier, RateLimitDecision, RateLimitError, RateLimitKey,
    RateLimiter, TokenCodec, TokenConfig, TokenError,
};
pub use utils::clock::{Clock, ManualClock, SharedClock, SystemClock};

use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

// Build application state from configuration: pick the store backend,
// seed the user directory and wire the components
pub async fn initialize_app_state(config: AppConfig) -> Result<AppState, InitError> {
    let clock: SharedClock = Arc::new(SystemClock);

    let store: SharedStore = match config.store_backend {
        StoreBackend::Redis => {
            info!(
                "Initializing Redis pool at {}",
                db::mask_redis_url(&config.redis.redis_url)
            );
            Arc::new(RedisPool::new(config.redis.clone()).await?)
        },
        StoreBackend::Memory => {
            info!("Using in-process store; rate limits are not shared between instances");
            let store = Arc::new(MemoryStore::new(clock.clone()));
            store.spawn_purge_task(db::memory_store::PURGE_INTERVAL);
            store
        },
    };

    let principals = Arc::new(InMemoryPrincipalRepository::new());
    db::seed_from_config(&principals, &config.seed, &config.password).await?;

    AppState::new(config, store, principals, clock)
}

/// Assemble the router: rate limiting runs first for every request, then each
/// protected group verifies the token and its required roles.
pub fn build_router(state: AppState) -> Router {
    let authenticated_guard = middleware::RouteGuard::new(
        state.access_guard.clone(),
        PermissionConfig::authenticated_roles(),
    );
    let user_management_guard = middleware::RouteGuard::new(
        state.access_guard.clone(),
        PermissionConfig::user_management_roles(),
    );
    let cors = middleware::CorsPolicy::from_server_config(&state.config.server);

    let authenticated = handlers::authenticated_routes().route_layer(from_fn_with_state(
        authenticated_guard,
        middleware::guard_middleware,
    ));
    let user_management = handlers::user_management_routes().route_layer(from_fn_with_state(
        user_management_guard,
        middleware::guard_middleware,
    ));

    Router::new()
        .merge(handlers::health_routes())
        .merge(handlers::auth_routes())
        .merge(authenticated)
        .merge(user_management)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cors, middleware::cors_middleware))
        .with_state(state)
}
