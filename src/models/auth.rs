// Authentication models: session claims and auth request/response bodies

use serde::{Deserialize, Serialize};
use std::fmt;

use super::principal::{Principal, Role};

/// Distinguishes short-lived access tokens from refresh tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims carried by every session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Principal ID (subject)
    pub sub: String,

    /// Role at issuance time
    pub role: Role,

    /// JWT ID (UUID v4)
    pub jti: String,

    pub typ: TokenType,

    pub aud: String,

    pub iss: String,

    /// Issued at (Unix epoch seconds)
    pub iat: u64,

    /// Expires at (Unix epoch seconds)
    pub exp: u64,
}

impl SessionClaims {
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        now_secs >= self.exp
    }
}

/// Login request body
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub user: Principal,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenVerifyResponse {
    pub valid: bool,
    pub user_id: String,
    pub role: Role,
    pub expires_at: u64,
}
