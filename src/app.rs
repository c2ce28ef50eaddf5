// Application state shared across handlers and middleware
use std::sync::Arc;
use thiserror::Error;

use crate::{
    app_config::{AppConfig, ConfigError},
    db::{RepositoryError, SharedPrincipalRepository, SharedStore},
    middleware::AccessGuard,
    services::{
        credentials::CredentialVerifier,
        rate_limit::RateLimiter,
        token::{TokenCodec, TokenConfig, TokenError},
    },
    utils::{clock::SharedClock, password::PasswordError},
};

/// Fatal start-up failures
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Token codec error: {0}")]
    Token(#[from] TokenError),

    #[error("Password configuration error: {0}")]
    Password(#[from] PasswordError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("User directory error: {0}")]
    Repository(#[from] RepositoryError),
}

// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: SharedStore,
    pub token_codec: TokenCodec,
    pub access_guard: AccessGuard,
    pub rate_limiter: Arc<RateLimiter>,
    pub credentials: Arc<CredentialVerifier>,
    pub principals: SharedPrincipalRepository,
    pub clock: SharedClock,
}

impl AppState {
    /// Wire the components. Fails when the token codec self-test or the
    /// password parameters are invalid.
    pub fn new(
        config: AppConfig,
        store: SharedStore,
        principals: SharedPrincipalRepository,
        clock: SharedClock,
    ) -> Result<Self, InitError> {
        let token_codec = TokenCodec::new(TokenConfig::from_settings(&config.jwt)?, clock.clone())?;
        let access_guard = AccessGuard::new(token_codec.clone());
        let rate_limiter = Arc::new(RateLimiter::from_config(
            store.clone(),
            clock.clone(),
            &config.rate_limit,
        ));
        let credentials = Arc::new(CredentialVerifier::new(
            principals.clone(),
            config.password.clone(),
        )?);

        Ok(Self {
            config: Arc::new(config),
            store,
            token_codec,
            access_guard,
            rate_limiter,
            credentials,
            principals,
            clock,
        })
    }
}
