// Rate limiting middleware: first stage of the request pipeline
// Runs before authentication, so counters are keyed by client address and route class

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::config::FailurePolicy;
use crate::services::rate_limit::{RateLimitError, RateLimitKey};
use crate::utils::auth_errors::{retry_after_seconds, AuthError};

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Client identifier used for rate limiting and auth logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    /// Peer address, or the first `X-Forwarded-For` hop when trusted
    pub fn from_request<B>(request: &Request<B>, trust_forwarded_for: bool) -> Self {
        if trust_forwarded_for {
            let forwarded = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());

            if let Some(ip) = forwarded {
                return Self(format!("ip_{}", ip));
            }
        }

        match request.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => Self(format!("ip_{}", addr.ip())),
            None => Self("ip_unknown".to_string()),
        }
    }

    pub fn ip(&self) -> &str {
        self.0.strip_prefix("ip_").unwrap_or(&self.0)
    }
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ClientIdentity>()
            .cloned()
            .unwrap_or_else(|| ClientIdentity("ip_unknown".to_string())))
    }
}

fn apply_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_at_ms: i64) {
    let reset_secs = (reset_at_ms.max(0) as u64).div_ceil(1000);
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_secs));
}

/// Count the request against its route class and reject it once the window is full
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let config = &state.config.rate_limit;

    let client = ClientIdentity::from_request(&request, config.trust_forwarded_for);
    request.extensions_mut().insert(client.clone());

    let path = request.uri().path().to_string();
    if !config.enabled || config.should_skip(&path) {
        return next.run(request).await;
    }

    let route = config.resolve(request.method().as_str(), &path);
    let key = RateLimitKey::new(client.0, route.route_class);

    match state.rate_limiter.check_and_increment(&key, &route.rule).await {
        Ok(decision) => {
            let mut response = next.run(request).await;
            apply_headers(
                response.headers_mut(),
                decision.limit,
                decision.remaining,
                decision.reset_at_ms,
            );
            response
        },
        Err(RateLimitError::RateLimited {
            retry_after,
            limit,
            reset_at_ms,
        }) => {
            info!(
                client = %key.client,
                route_class = %key.route_class,
                retry_after_secs = retry_after_seconds(retry_after),
                "Rate limit exceeded"
            );
            let mut response = AuthError::RateLimited {
                retry_after_seconds: retry_after_seconds(retry_after),
            }
            .into_response();
            apply_headers(response.headers_mut(), limit, 0, reset_at_ms);
            response
        },
        Err(RateLimitError::Unavailable(reason)) => match config.failure_policy {
            FailurePolicy::FailOpen => {
                warn!(
                    route_class = %key.route_class,
                    reason = %reason,
                    "Rate limiter unavailable, allowing request"
                );
                next.run(request).await
            },
            FailurePolicy::FailClosed => {
                error!(
                    route_class = %key.route_class,
                    reason = %reason,
                    "Rate limiter unavailable, rejecting request"
                );
                AuthError::RateLimiterUnavailable.into_response()
            },
        },
    }
}
