// Access guard: token verification plus role check as a single decision

use thiserror::Error;

use crate::models::auth::SessionClaims;
use crate::models::principal::{Role, RoleSet};
use crate::services::token::{TokenCodec, TokenError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Role {role} is not permitted, requires {required}")]
    Forbidden { role: Role, required: RoleSet },
}

impl From<TokenError> for GuardError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::TokenExpired => GuardError::TokenExpired,
            _ => GuardError::InvalidToken,
        }
    }
}

/// Verifies a bearer token and checks its role against a route's
/// requirement. Holds no state beyond the codec.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    codec: TokenCodec,
}

impl AccessGuard {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }

    /// Authorize at the codec's current time.
    /// An empty `required` set admits any authenticated role.
    pub fn authorize(&self, token: &str, required: &RoleSet) -> Result<SessionClaims, GuardError> {
        let claims = self.codec.verify(token)?;
        Self::check_role(claims, required)
    }

    pub fn authorize_at(
        &self,
        token: &str,
        required: &RoleSet,
        now_secs: u64,
    ) -> Result<SessionClaims, GuardError> {
        let claims = self.codec.verify_at(token, now_secs)?;
        Self::check_role(claims, required)
    }

    fn check_role(claims: SessionClaims, required: &RoleSet) -> Result<SessionClaims, GuardError> {
        if required.permits(claims.role) {
            Ok(claims)
        } else {
            Err(GuardError::Forbidden {
                role: claims.role,
                required: required.clone(),
            })
        }
    }
}
