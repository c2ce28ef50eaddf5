// Health check handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::app::AppState;
use crate::services::RateLimitKey;

const CHECK_KEY: &str = "health:check";
const CHECK_TTL: Duration = Duration::from_secs(10);

/// Counter read through the limiter to confirm it can reach the store
const LIMITER_CHECK_CLIENT: &str = "health_check";

/// GET /health - Liveness
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "hospital-access-core",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Rejection counts for the configured route classes that have any
async fn rejection_stats(state: &AppState) -> Map<String, Value> {
    let mut stats = Map::new();
    for route_class in state.config.rate_limit.endpoints.keys() {
        match state.rate_limiter.rejected_count(route_class).await {
            Ok(0) => {},
            Ok(count) => {
                stats.insert(route_class.clone(), json!(count));
            },
            Err(_) => break,
        }
    }
    stats
}

/// GET /health/detailed - Write and read back a key in the shared store,
/// then read a counter through the rate limiter
pub async fn detailed_health_check(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = chrono::Utc::now().to_rfc3339();
    let check_value = state.clock.now_millis().to_string();
    let start = Instant::now();

    let round_trip = async {
        state
            .store
            .set_with_expiry(CHECK_KEY, &check_value, CHECK_TTL)
            .await?;
        state.store.get(CHECK_KEY).await
    };

    let store_health = match round_trip.await {
        Ok(Some(value)) if value == check_value => Ok(start.elapsed().as_millis() as u64),
        Ok(_) => Err("check value was not read back".to_string()),
        Err(e) => Err(e.to_string()),
    };

    let route = state.config.rate_limit.resolve("GET", "/health");
    let limiter_key = RateLimitKey::new(LIMITER_CHECK_CLIENT, route.route_class);
    let limiter_json = match state.rate_limiter.status(&limiter_key, &route.rule).await {
        Ok(_) => json!({ "status": "healthy", "error": null }),
        Err(e) => json!({ "status": "unhealthy", "error": e.to_string() }),
    };

    let healthy = store_health.is_ok() && limiter_json["status"] == "healthy";
    let store_json = match &store_health {
        Ok(latency_ms) => json!({
            "status": "healthy",
            "backend": state.store.backend_name(),
            "latency_ms": latency_ms,
            "error": null
        }),
        Err(e) => {
            warn!(error = %e, backend = state.store.backend_name(), "Store health check failed");
            json!({
                "status": "unhealthy",
                "backend": state.store.backend_name(),
                "error": e
            })
        },
    };

    let rejected = rejection_stats(&state).await;

    let response = json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "hospital-access-core",
        "environment": state.config.server.environment.to_string(),
        "timestamp": timestamp,
        "components": {
            "store": store_json,
            "rate_limiting": {
                "enabled": state.config.rate_limit.enabled,
                "failure_policy": state.config.rate_limit.failure_policy.to_string(),
                "counters": limiter_json,
                "rejected": rejected,
            }
        }
    });

    if healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}
