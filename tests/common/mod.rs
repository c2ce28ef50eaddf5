// Common test utilities and helper structs
// Shared across all test files to avoid duplication
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Request, Response, StatusCode},
    Router,
};
use hospital_access_core::{
    app_config::AppConfig,
    build_router,
    db::{InMemoryPrincipalRepository, MemoryStore, SharedStore},
    models::principal::{Principal, Role},
    utils::{clock::ManualClock, password::PasswordConfig},
    AppState,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TEST_SECRET: &str = "test-signing-secret-hs256-minimum-32-characters";
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// Cheap Argon2 parameters so tests don't spend seconds hashing
pub fn fast_password_config() -> PasswordConfig {
    PasswordConfig {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
        output_length: 32,
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::with_jwt_secret(TEST_SECRET);
    config.password = fast_password_config();
    config
}

/// Test application wrapper
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub clock: ManualClock,
    pub principals: Arc<InMemoryPrincipalRepository>,
}

impl TestApp {
    pub fn post(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "POST", uri)
    }

    pub fn get(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "GET", uri)
    }

    /// Create an active principal with `TEST_PASSWORD`
    pub async fn create_user(&self, email: &str, role: Role) -> Principal {
        self.principals
            .create(email, TEST_PASSWORD, role, &fast_password_config())
            .await
            .unwrap()
    }

    /// Access token for a principal, issued at the app clock's current time
    pub fn token_for(&self, principal: &Principal) -> String {
        self.state.token_codec.issue(principal).unwrap()
    }
}

/// Test request builder
pub struct TestRequest<'a> {
    app: &'a TestApp,
    method: &'static str,
    uri: String,
    headers: Vec<(header::HeaderName, String)>,
    body: Option<Vec<u8>>,
    ip: String,
}

impl<'a> TestRequest<'a> {
    fn new(app: &'a TestApp, method: &'static str, uri: &str) -> Self {
        Self {
            app,
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
            body: None,
            ip: "127.0.0.1:40000".to_string(),
        }
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        self.body = Some(serde_json::to_vec(body).unwrap());
        self.headers
            .push((header::CONTENT_TYPE, "application/json".to_string()));
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.headers
            .push((header::AUTHORIZATION, format!("Bearer {}", token)));
        self
    }

    pub fn header(mut self, name: header::HeaderName, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    /// Peer address for this request (rate limits are keyed on it)
    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip = ip.to_string();
        self
    }

    pub async fn send(self) -> TestResponse {
        let mut builder = Request::builder().method(self.method).uri(&self.uri);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let mut request = builder
            .body(self.body.map(Body::from).unwrap_or_else(Body::empty))
            .unwrap();

        request
            .extensions_mut()
            .insert(ConnectInfo(self.ip.parse::<SocketAddr>().unwrap()));

        let response = self.app.app.clone().oneshot(request).await.unwrap();
        TestResponse { response }
    }
}

/// Test response wrapper
pub struct TestResponse {
    response: Response<Body>,
}

impl TestResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    pub fn header_str(&self, name: &str) -> Option<String> {
        self.response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub async fn json<T: serde::de::DeserializeOwned>(self) -> T {
        let body = axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}

/// Build a test application around an in-memory store and a manual clock
pub async fn setup_test_app_with(config: AppConfig) -> TestApp {
    let clock = ManualClock::starting_now();
    let store: SharedStore = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
    setup_test_app_with_store(config, store, clock).await
}

pub async fn setup_test_app_with_store(
    config: AppConfig,
    store: SharedStore,
    clock: ManualClock,
) -> TestApp {
    let principals = Arc::new(InMemoryPrincipalRepository::new());
    let state = AppState::new(config, store, principals.clone(), Arc::new(clock.clone())).unwrap();
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        clock,
        principals,
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(test_config()).await
}
