// Session token codec: HS256 JWTs for access and refresh tokens
// Expiry is checked against the injected clock, never the library's own time source

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::auth::{SessionClaims, TokenType};
use crate::models::principal::{Principal, Role};
use crate::utils::clock::SharedClock;

/// Minimum HMAC secret length in bytes
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    #[error("JWT encoding error: {0}")]
    EncodingError(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token codec misconfigured: {0}")]
    Misconfigured(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            // Not reachable with validate_exp off, kept so the mapping stays total
            ErrorKind::ExpiredSignature => TokenError::TokenExpired,
            _ => TokenError::InvalidToken,
        }
    }
}

#[derive(Clone)]
pub struct TokenConfig {
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub algorithm: Algorithm,
    pub audience: String,
    pub issuer: String,
    pub key_version: u32,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("algorithm", &self.algorithm)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("encoding_key", &"<redacted>")
            .field("decoding_key", &"<redacted>")
            .field("key_version", &self.key_version)
            .finish()
    }
}

impl TokenConfig {
    pub fn new(
        secret: &str,
        access_ttl_seconds: u64,
        refresh_ttl_seconds: u64,
        audience: impl Into<String>,
        issuer: impl Into<String>,
        key_version: u32,
    ) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(TokenError::Misconfigured(format!(
                "secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if access_ttl_seconds == 0 || refresh_ttl_seconds == 0 {
            return Err(TokenError::Misconfigured(
                "token lifetimes must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            access_ttl_seconds,
            refresh_ttl_seconds,
            algorithm: Algorithm::HS256,
            audience: audience.into(),
            issuer: issuer.into(),
            key_version,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    /// Build from the `jwt` section of the application config
    pub fn from_settings(settings: &crate::app_config::JwtSettings) -> Result<Self, TokenError> {
        Self::new(
            &settings.secret,
            settings.access_ttl_seconds,
            settings.refresh_ttl_seconds,
            settings.audience.clone(),
            settings.issuer.clone(),
            settings.key_version,
        )
    }

    fn ttl_for(&self, typ: TokenType) -> u64 {
        match typ {
            TokenType::Access => self.access_ttl_seconds,
            TokenType::Refresh => self.refresh_ttl_seconds,
        }
    }
}

/// Issues and verifies session tokens. Stateless apart from its config.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    config: TokenConfig,
    clock: SharedClock,
}

impl TokenCodec {
    /// Create the codec and run a sign/verify self-test.
    /// A failing self-test means the process must not start.
    pub fn new(config: TokenConfig, clock: SharedClock) -> Result<Self, TokenError> {
        let codec = Self { config, clock };

        let sample = Principal {
            id: Uuid::nil(),
            email: "self-test@localhost".to_string(),
            role: Role::User,
        };
        let now = codec.clock.now_secs();
        let token = codec
            .encode_at(&sample, TokenType::Access, now)
            .map_err(|e| TokenError::Misconfigured(format!("self-test signing failed: {}", e)))?;
        codec
            .decode_at(&token, TokenType::Access, now)
            .map_err(|e| TokenError::Misconfigured(format!("self-test verify failed: {}", e)))?;

        Ok(codec)
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn access_ttl_seconds(&self) -> u64 {
        self.config.access_ttl_seconds
    }

    /// Issue an access token for the principal
    #[instrument(skip(self, principal), fields(user_id = %principal.id))]
    pub fn issue(&self, principal: &Principal) -> Result<String, TokenError> {
        self.encode_at(principal, TokenType::Access, self.clock.now_secs())
    }

    /// Issue a refresh token for the principal
    #[instrument(skip(self, principal), fields(user_id = %principal.id))]
    pub fn issue_refresh(&self, principal: &Principal) -> Result<String, TokenError> {
        self.encode_at(principal, TokenType::Refresh, self.clock.now_secs())
    }

    /// Verify an access token at the current clock time
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify_at(token, self.clock.now_secs())
    }

    /// Verify an access token at an explicit time (Unix epoch seconds)
    ///
    /// # Errors
    /// * `TokenError::InvalidToken` - bad signature, malformed payload, wrong
    ///   issuer, audience or token type
    /// * `TokenError::TokenExpired` - `now_secs >= exp`, no leeway
    pub fn verify_at(&self, token: &str, now_secs: u64) -> Result<SessionClaims, TokenError> {
        self.decode_at(token, TokenType::Access, now_secs)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify_refresh_at(token, self.clock.now_secs())
    }

    pub fn verify_refresh_at(
        &self,
        token: &str,
        now_secs: u64,
    ) -> Result<SessionClaims, TokenError> {
        self.decode_at(token, TokenType::Refresh, now_secs)
    }

    fn encode_at(
        &self,
        principal: &Principal,
        typ: TokenType,
        now_secs: u64,
    ) -> Result<String, TokenError> {
        let claims = SessionClaims {
            sub: principal.id.to_string(),
            role: principal.role,
            jti: Uuid::new_v4().to_string(),
            typ,
            aud: self.config.audience.clone(),
            iss: self.config.issuer.clone(),
            iat: now_secs,
            exp: now_secs + self.config.ttl_for(typ),
        };

        let mut header = Header::new(self.config.algorithm);
        header.kid = Some(self.config.key_version.to_string());

        encode(&header, &claims, &self.config.encoding_key)
            .map_err(|e| TokenError::EncodingError(e.to_string()))
    }

    fn decode_at(
        &self,
        token: &str,
        expected: TokenType,
        now_secs: u64,
    ) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        // Expiry is checked below against the supplied time
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<SessionClaims>(token, &self.config.decoding_key, &validation)
            .map_err(|e| {
                debug!(error = %e, "Token rejected by decoder");
                TokenError::from(e)
            })?
            .claims;

        if claims.typ != expected {
            debug!(expected = ?expected, actual = ?claims.typ, "Token type mismatch");
            return Err(TokenError::InvalidToken);
        }

        if claims.is_expired_at(now_secs) {
            return Err(TokenError::TokenExpired);
        }

        Ok(claims)
    }
}
