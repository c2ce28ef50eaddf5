use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub redis_url: String,
    pub pool_size: u32,
    pub connection_timeout: Duration,
    pub command_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Prefix applied to every key written through the pool
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 8,
            connection_timeout: Duration::from_secs(5),
            // Rate limiting sits on the request path, keep this short
            command_timeout: Duration::from_millis(250),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(100),
            key_prefix: String::new(),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl RedisConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            pool_size: env_or("REDIS_POOL_SIZE", defaults.pool_size),
            connection_timeout: Duration::from_secs(env_or(
                "REDIS_CONNECTION_TIMEOUT",
                defaults.connection_timeout.as_secs(),
            )),
            command_timeout: Duration::from_millis(env_or(
                "REDIS_COMMAND_TIMEOUT_MS",
                defaults.command_timeout.as_millis() as u64,
            )),
            retry_attempts: env_or("REDIS_RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_delay: Duration::from_millis(env_or(
                "REDIS_RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            )),
            key_prefix: std::env::var("REDIS_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.redis_url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.pool_size == 0 {
            return Err("Pool size must be greater than 0".to_string());
        }
        if self.pool_size > 1000 {
            return Err("Pool size too large (max: 1000)".to_string());
        }
        if self.connection_timeout.is_zero() {
            return Err("Connection timeout must be greater than 0".to_string());
        }
        if self.command_timeout.is_zero() {
            return Err("Command timeout must be greater than 0".to_string());
        }
        if self.retry_attempts == 0 {
            return Err("Retry attempts must be greater than 0".to_string());
        }
        Ok(())
    }
}
