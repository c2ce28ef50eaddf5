// Authentication-specific error handling utilities
// Every rejection from the access pipeline is rendered through AuthError

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use thiserror::Error;

use crate::middleware::guard::GuardError;
use crate::services::credentials::CredentialError;
use crate::services::rate_limit::RateLimitError;
use crate::services::token::TokenError;

/// Authentication-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Missing or invalid authorization header")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Access denied. Required roles: {required}")]
    Forbidden { required: String },

    #[error("Too many requests")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Rate limiter unavailable")]
    RateLimiterUnavailable,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal server error")]
    InternalError,
}

/// Standard authentication response structure
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl AuthError {
    /// Convert to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::RateLimiterUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AuthError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::Forbidden { .. } => "FORBIDDEN",
            AuthError::RateLimited { .. } => "RATE_LIMITED",
            AuthError::RateLimiterUnavailable => "RATE_LIMITER_UNAVAILABLE",
            AuthError::ValidationError(_) => "VALIDATION_ERROR",
            AuthError::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Get retry_after value if applicable
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AuthError::RateLimited {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let retry_after = self.retry_after();
        let body = AuthErrorResponse {
            success: false,
            error: ErrorDetail {
                code: self.error_code().to_string(),
                description: self.to_string(),
                retry_after,
            },
            message: self.to_string(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        if status == StatusCode::UNAUTHORIZED && self != AuthError::InvalidCredentials {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::TokenExpired => AuthError::TokenExpired,
            TokenError::InvalidToken => AuthError::InvalidToken,
            TokenError::EncodingError(_) | TokenError::Misconfigured(_) => AuthError::InternalError,
        }
    }
}

impl From<GuardError> for AuthError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::InvalidToken => AuthError::InvalidToken,
            GuardError::TokenExpired => AuthError::TokenExpired,
            GuardError::Forbidden { required, .. } => AuthError::Forbidden {
                required: required.to_string(),
            },
        }
    }
}

impl From<CredentialError> for AuthError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidCredentials => AuthError::InvalidCredentials,
            CredentialError::Repository(e) => {
                tracing::error!(error = %e, "User directory failure during login");
                AuthError::InternalError
            },
            CredentialError::Internal(e) => {
                tracing::error!(error = %e, "Credential check failed");
                AuthError::InternalError
            },
        }
    }
}

impl From<RateLimitError> for AuthError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::RateLimited { retry_after, .. } => AuthError::RateLimited {
                retry_after_seconds: retry_after_seconds(retry_after),
            },
            RateLimitError::Unavailable(_) => AuthError::RateLimiterUnavailable,
        }
    }
}

/// Whole seconds for a Retry-After header, rounded up and never 0
pub fn retry_after_seconds(retry_after: std::time::Duration) -> u64 {
    let millis = retry_after.as_millis() as u64;
    millis.div_ceil(1000).max(1)
}

/// Helper function to log authentication failures
pub fn log_auth_failure(
    user_email: &str,
    ip_address: &str,
    error: &AuthError,
    user_agent: Option<&str>,
) {
    tracing::warn!(
        email = user_email,
        ip = ip_address,
        user_agent = user_agent.unwrap_or("unknown"),
        error_code = error.error_code(),
        "Authentication failure"
    );
}
