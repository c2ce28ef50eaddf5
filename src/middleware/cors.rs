use axum::{
    body::Body,
    extract::State,
    http::{
        header::{self, HeaderValue},
        Method, Request, Response, StatusCode,
    },
    middleware::Next,
};
use std::sync::Arc;
use tracing::debug;

use crate::app_config::ServerConfig;

/// Origins the browser-facing API answers to
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Arc<Vec<String>>,
    /// `*` configured outside production: reflect any origin
    reflect_any: bool,
}

impl CorsPolicy {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        let has_wildcard = config.cors_allowed_origins.iter().any(|o| o == "*");
        Self {
            allowed_origins: Arc::new(config.cors_allowed_origins.clone()),
            reflect_any: has_wildcard
                && config.environment != crate::app_config::Environment::Production,
        }
    }

    fn allowed_origin(&self, origin: Option<&str>) -> Option<HeaderValue> {
        let origin = origin?;
        let allowed = self.reflect_any || self.allowed_origins.iter().any(|o| o == origin);
        if !allowed {
            debug!("CORS: Origin not in whitelist: {}", origin);
            return None;
        }
        HeaderValue::from_str(origin).ok()
    }
}

/// CORS middleware that reflects whitelisted origins and supports credentials
pub async fn cors_middleware(
    State(policy): State<CorsPolicy>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    let allowed_origin = policy.allowed_origin(origin);

    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        if let Some(allowed) = allowed_origin {
            let headers = response.headers_mut();
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allowed);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("content-type, authorization, accept, origin"),
            );
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("3600"));
        }

        return response;
    }

    let mut response = next.run(req).await;

    if let Some(allowed) = allowed_origin {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allowed);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(
                "retry-after, x-ratelimit-limit, x-ratelimit-remaining, x-ratelimit-reset",
            ),
        );
    }

    response
}
