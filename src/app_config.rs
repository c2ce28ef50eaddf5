// Centralized configuration management for the hospital access core
// Env vars are read once at startup into an AppConfig that is passed down explicitly

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::config::RateLimitingConfig;
use crate::db::RedisConfig;
use crate::utils::password::PasswordConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Parse an optional env var, falling back to `default` when unset
pub(crate) fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("cannot parse '{}'", raw))
        }),
        Err(_) => Ok(default),
    }
}

pub(crate) fn env_bool_or(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                "expected true or false".to_string(),
            )),
        },
        Err(_) => Ok(default),
    }
}

fn get_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub jwt: JwtSettings,
    pub password: PasswordConfig,
    pub redis: RedisConfig,
    pub rate_limit: RateLimitingConfig,
    pub store_backend: StoreBackend,
    pub seed: SeedConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub environment: Environment,
    pub cors_allowed_origins: Vec<String>,
}

/// Environment type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" => Environment::Test,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Token signing settings
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    #[serde(skip_serializing)]
    pub secret: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub audience: String,
    pub issuer: String,
    pub key_version: u32,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("key_version", &self.key_version)
            .finish()
    }
}

/// Which shared store backs the rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

/// Initial developer account created at startup
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SeedConfig {
    pub dev_email: Option<String>,
    #[serde(skip_serializing)]
    pub dev_password: Option<String>,
}

impl std::fmt::Debug for SeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedConfig")
            .field("dev_email", &self.dev_email)
            .field("dev_password", &self.dev_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

const DEFAULT_ACCESS_TTL: u64 = 1800; // 30 minutes
const DEFAULT_REFRESH_TTL: u64 = 2_592_000; // 30 days

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret =
            env::var("JWT_SECRET_KEY").map_err(|_| ConfigError::MissingVar("JWT_SECRET_KEY".to_string()))?;
        if secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET_KEY".to_string(),
                "Secret must be at least 32 characters long".to_string(),
            ));
        }

        let environment = Environment::from(get_or_default("ENVIRONMENT", "development"));

        let cors_allowed_origins = get_or_default(
            "CORS_ALLOWED_ORIGINS",
            "http://localhost:5173,http://127.0.0.1:5173",
        )
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        let server = ServerConfig {
            bind_address: get_or_default("BIND_ADDRESS", "0.0.0.0:8000"),
            environment,
            cors_allowed_origins,
        };

        let jwt = JwtSettings {
            secret,
            access_ttl_seconds: env_or("JWT_ACCESS_TTL_SECONDS", DEFAULT_ACCESS_TTL)?,
            refresh_ttl_seconds: env_or("JWT_REFRESH_TTL_SECONDS", DEFAULT_REFRESH_TTL)?,
            audience: get_or_default("JWT_AUDIENCE", "hospital-api"),
            issuer: get_or_default("JWT_ISSUER", "hospital-auth"),
            key_version: env_or("JWT_KEY_VERSION", 1)?,
        };

        let password_defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_cost: env_or("PASSWORD_MEMORY_COST", password_defaults.memory_cost)?,
            time_cost: env_or("PASSWORD_TIME_COST", password_defaults.time_cost)?,
            parallelism: env_or("PASSWORD_PARALLELISM", password_defaults.parallelism)?,
            output_length: password_defaults.output_length,
        };
        password
            .validate()
            .map_err(|e| ConfigError::InvalidValue("PASSWORD_*".to_string(), e.to_string()))?;

        let redis = RedisConfig::from_env();
        redis
            .validate()
            .map_err(|e| ConfigError::InvalidValue("REDIS_*".to_string(), e))?;

        let seed = SeedConfig {
            dev_email: env::var("DEV_EMAIL").ok().filter(|s| !s.is_empty()),
            dev_password: env::var("DEV_PASSWORD").ok().filter(|s| !s.is_empty()),
        };

        Ok(AppConfig {
            server,
            jwt,
            password,
            redis,
            rate_limit: RateLimitingConfig::from_env()?,
            store_backend: env_or("STORE_BACKEND", StoreBackend::Redis)?,
            seed,
        })
    }

    /// Defaults with the given signing secret; reads no environment variables
    pub fn with_jwt_secret(secret: impl Into<String>) -> Self {
        AppConfig {
            server: ServerConfig {
                bind_address: "127.0.0.1:0".to_string(),
                environment: Environment::Test,
                cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            },
            jwt: JwtSettings {
                secret: secret.into(),
                access_ttl_seconds: DEFAULT_ACCESS_TTL,
                refresh_ttl_seconds: DEFAULT_REFRESH_TTL,
                audience: "hospital-api".to_string(),
                issuer: "hospital-auth".to_string(),
                key_version: 1,
            },
            password: PasswordConfig::default(),
            redis: RedisConfig::default(),
            rate_limit: RateLimitingConfig::default(),
            store_backend: StoreBackend::Memory,
            seed: SeedConfig::default(),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.server.environment == Environment::Production
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.server.environment == Environment::Development
    }
}
