// End-to-end tests for the request pipeline: rate limit -> token -> role -> handler

use async_trait::async_trait;
use axum::http::StatusCode;
use hospital_access_core::{
    config::{FailurePolicy, RateLimitRule},
    db::{KeyValueStore, StoreError},
    models::principal::Role,
    utils::clock::ManualClock,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{setup_test_app, setup_test_app_with, setup_test_app_with_store, test_config, TEST_PASSWORD};

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_fixed_window_sequence_then_reset() {
    let mut config = test_config();
    config
        .rate_limit
        .endpoints
        .insert("/roles".to_string(), RateLimitRule::new(3, 60));
    let app = setup_test_app_with(config).await;

    let user = app.create_user("nurse@hospital.local", Role::User).await;
    let token = app.token_for(&user);

    let mut statuses = Vec::new();
    for _ in 0..5 {
        let response = app.get("/roles").bearer(&token).send().await;
        statuses.push(response.status());
    }
    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );

    app.clock.advance(Duration::from_secs(61));
    let response = app.get("/roles").bearer(&token).send().await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.header_str("x-ratelimit-remaining").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_rate_limit_headers_and_retry_after() {
    let mut config = test_config();
    config
        .rate_limit
        .endpoints
        .insert("/roles".to_string(), RateLimitRule::new(2, 60));
    let app = setup_test_app_with(config).await;

    let user = app.create_user("clerk@hospital.local", Role::User).await;
    let token = app.token_for(&user);

    let first = app.get("/roles").bearer(&token).send().await;
    assert_eq!(first.header_str("x-ratelimit-limit").as_deref(), Some("2"));
    assert_eq!(first.header_str("x-ratelimit-remaining").as_deref(), Some("1"));
    assert!(first.header_str("x-ratelimit-reset").is_some());

    app.get("/roles").bearer(&token).send().await;

    app.clock.advance(Duration::from_secs(20));
    let limited = app.get("/roles").bearer(&token).send().await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.header_str("x-ratelimit-remaining").as_deref(), Some("0"));

    let retry_after: u64 = limited.header_str("retry-after").unwrap().parse().unwrap();
    assert!((39..=40).contains(&retry_after), "retry_after = {}", retry_after);

    let body: Value = limited.json().await;
    assert_eq!(error_code(&body), "RATE_LIMITED");
}

#[tokio::test]
async fn test_rate_limit_runs_before_authentication() {
    let mut config = test_config();
    config
        .rate_limit
        .endpoints
        .insert("/users".to_string(), RateLimitRule::new(1, 60));
    let app = setup_test_app_with(config).await;

    let first = app.get("/users").send().await;
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    // The rejected request still consumed the window
    let second = app.get("/users").send().await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_clients_have_separate_windows() {
    let mut config = test_config();
    config
        .rate_limit
        .endpoints
        .insert("/health".to_string(), RateLimitRule::new(1, 60));
    let app = setup_test_app_with(config).await;

    let a = app.get("/health").with_ip("10.0.0.1:1000").send().await;
    let a_again = app.get("/health").with_ip("10.0.0.1:1001").send().await;
    let b = app.get("/health").with_ip("10.0.0.2:1000").send().await;

    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(b.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_and_malformed_tokens() {
    let app = setup_test_app().await;

    let response = app.get("/auth/me").send().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.header_str("www-authenticate").as_deref(), Some("Bearer"));
    let body: Value = response.json().await;
    assert_eq!(error_code(&body), "MISSING_TOKEN");

    let response = app.get("/auth/me").bearer("not.a.token").send().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await;
    assert_eq!(error_code(&body), "INVALID_TOKEN");
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = setup_test_app().await;
    let user = app.create_user("expiring@hospital.local", Role::User).await;
    let token = app.token_for(&user);

    let response = app.get("/auth/me").bearer(&token).send().await;
    assert_eq!(response.status(), StatusCode::OK);

    // Exactly at exp the token is no longer valid
    app.clock
        .advance(Duration::from_secs(app.state.config.jwt.access_ttl_seconds));
    let response = app.get("/auth/me").bearer(&token).send().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await;
    assert_eq!(error_code(&body), "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_role_restricted_routes() {
    let app = setup_test_app().await;
    let user = app.create_user("patient-desk@hospital.local", Role::User).await;
    let admin = app.create_user("admin@hospital.local", Role::Admin).await;
    let developer = app.create_user("dev@hospital.local", Role::Developer).await;

    let response = app.get("/users").bearer(&app.token_for(&user)).send().await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await;
    assert_eq!(error_code(&body), "FORBIDDEN");

    for principal in [&admin, &developer] {
        let response = app.get("/users").bearer(&app.token_for(principal)).send().await;
        assert_eq!(response.status(), StatusCode::OK);
        let users: Vec<Value> = response.json().await;
        assert_eq!(users.len(), 3);
    }

    // Any authenticated role may list roles
    let response = app.get("/roles").bearer(&app.token_for(&user)).send().await;
    assert_eq!(response.status(), StatusCode::OK);
    let roles: Vec<Value> = response.json().await;
    assert_eq!(roles.len(), 3);
}

#[tokio::test]
async fn test_role_in_token_is_authoritative_until_refresh() {
    let app = setup_test_app().await;
    let admin = app.create_user("demoted@hospital.local", Role::Admin).await;

    let login = app
        .post("/auth/login")
        .json(&json!({"email": "demoted@hospital.local", "password": TEST_PASSWORD}))
        .send()
        .await;
    assert_eq!(login.status(), StatusCode::OK);
    let tokens: Value = login.json().await;
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let refresh = tokens["refresh_token"].as_str().unwrap().to_string();

    app.principals.set_role(admin.id, Role::User).await;

    // Existing access token still carries the old role
    let response = app.get("/users").bearer(&access).send().await;
    assert_eq!(response.status(), StatusCode::OK);

    let refreshed = app
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await;
    assert_eq!(refreshed.status(), StatusCode::OK);
    let body: Value = refreshed.json().await;
    let new_access = body["access_token"].as_str().unwrap();

    let response = app.get("/users").bearer(new_access).send().await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_and_token_introspection() {
    let app = setup_test_app().await;
    let user = app.create_user("Ward.Nurse@Hospital.local", Role::User).await;

    let response = app
        .post("/auth/login")
        .json(&json!({"email": " ward.nurse@hospital.local ", "password": TEST_PASSWORD}))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await;
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["expires_in"], 1800);
    assert_eq!(body["user"]["role"], "user");
    let access = body["access_token"].as_str().unwrap().to_string();

    let response = app.get("/auth/verify").bearer(&access).send().await;
    assert_eq!(response.status(), StatusCode::OK);
    let info: Value = response.json().await;
    assert_eq!(info["valid"], true);
    assert_eq!(info["user_id"], user.id.to_string());
    assert_eq!(info["role"], "user");

    let response = app.get("/auth/me").bearer(&access).send().await;
    let me: Value = response.json().await;
    assert_eq!(me["email"], "ward.nurse@hospital.local");
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = setup_test_app().await;
    let disabled = app.create_user("disabled@hospital.local", Role::User).await;
    app.create_user("active@hospital.local", Role::User).await;
    app.principals.set_active(disabled.id, false).await;

    let attempts = [
        ("active@hospital.local", "wrong password", "10.0.1.1:1"),
        ("nobody@hospital.local", TEST_PASSWORD, "10.0.1.2:1"),
        ("disabled@hospital.local", TEST_PASSWORD, "10.0.1.3:1"),
    ];

    for (email, password, ip) in attempts {
        let response = app
            .post("/auth/login")
            .with_ip(ip)
            .json(&json!({"email": email, "password": password}))
            .send()
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", email);
        assert!(response.header_str("www-authenticate").is_none());
        let body: Value = response.json().await;
        assert_eq!(error_code(&body), "INVALID_CREDENTIALS");
        assert_eq!(body["message"], "Invalid email or password");
    }
}

#[tokio::test]
async fn test_login_is_limited_per_client() {
    let app = setup_test_app().await;
    app.create_user("brute@hospital.local", Role::User).await;

    // The /auth budget is 5 requests per 300 seconds
    for _ in 0..5 {
        let response = app
            .post("/auth/login")
            .with_ip("198.51.100.7:5000")
            .json(&json!({"email": "brute@hospital.local", "password": "guess"}))
            .send()
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .post("/auth/login")
        .with_ip("198.51.100.7:5000")
        .json(&json!({"email": "brute@hospital.local", "password": TEST_PASSWORD}))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_refresh_token_cannot_be_used_as_access_token() {
    let app = setup_test_app().await;
    let user = app.create_user("refresh-misuse@hospital.local", Role::Admin).await;
    let refresh = app.state.token_codec.issue_refresh(&user).unwrap();

    let response = app.get("/users").bearer(&refresh).send().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let access = app.token_for(&user);
    let response = app
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": access }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_detailed_health_reports_store() {
    let app = setup_test_app().await;
    let response = app.get("/health/detailed").send().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["store"]["backend"], "memory");
}

#[tokio::test]
async fn test_detailed_health_reports_rejections() {
    let mut config = test_config();
    config
        .rate_limit
        .endpoints
        .insert("/auth/verify".to_string(), RateLimitRule::new(1, 60));
    let app = setup_test_app_with(config).await;

    let response = app.get("/health/detailed").send().await;
    let body: Value = response.json().await;
    assert_eq!(body["components"]["rate_limiting"]["counters"]["status"], "healthy");
    assert_eq!(body["components"]["rate_limiting"]["rejected"], json!({}));

    app.get("/auth/verify").send().await;
    for _ in 0..2 {
        let response = app.get("/auth/verify").send().await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    let response = app
        .get("/health/detailed")
        .with_ip("10.9.9.9:1000")
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await;
    assert_eq!(body["components"]["rate_limiting"]["rejected"]["/auth/verify"], 2);
}

/// Store that fails every call
struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn incr_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _expected: Option<&str>,
        _new: &str,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn test_store_outage_fail_open() {
    let config = test_config();
    assert_eq!(config.rate_limit.failure_policy, FailurePolicy::FailOpen);
    let app = setup_test_app_with_store(config, Arc::new(BrokenStore), ManualClock::starting_now()).await;

    let response = app.get("/health").send().await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.header_str("x-ratelimit-limit").is_none());

    let response = app.get("/health/detailed").send().await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_store_outage_fail_closed() {
    let mut config = test_config();
    config.rate_limit.failure_policy = FailurePolicy::FailClosed;
    let app = setup_test_app_with_store(config, Arc::new(BrokenStore), ManualClock::starting_now()).await;

    let response = app.get("/health").send().await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await;
    assert_eq!(error_code(&body), "RATE_LIMITER_UNAVAILABLE");
}

#[tokio::test]
async fn test_disabled_rate_limiting_passes_everything() {
    let mut config = test_config();
    config.rate_limit.enabled = false;
    config
        .rate_limit
        .endpoints
        .insert("/health".to_string(), RateLimitRule::new(1, 60));
    let app = setup_test_app_with(config).await;

    for _ in 0..3 {
        let response = app.get("/health").send().await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_cors_preflight_for_whitelisted_origin() {
    let app = setup_test_app().await;

    let response = app
        .get("/health")
        .header(axum::http::header::ORIGIN, "http://localhost:5173")
        .send()
        .await;
    assert_eq!(
        response.header_str("access-control-allow-origin").as_deref(),
        Some("http://localhost:5173")
    );

    let response = app
        .get("/health")
        .header(axum::http::header::ORIGIN, "http://elsewhere.example")
        .send()
        .await;
    assert!(response.header_str("access-control-allow-origin").is_none());
}
