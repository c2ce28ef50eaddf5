use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::{thread_rng, Rng};
use redis::{aio::ConnectionManager, Client, RedisError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use super::redis_config::RedisConfig;
use super::store::{ttl_millis, KeyValueStore, StoreError};

/// Maximum delay cap for exponential backoff to prevent extremely long waits
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// INCR that only sets the expiry when the key is created
static INCR_WITH_EXPIRY: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
            local count = redis.call('INCR', KEYS[1])
            if count == 1 then
                redis.call('PEXPIRE', KEYS[1], ARGV[1])
            end
            return count
        "#,
    )
});

/// Compare-and-swap with expiry.
/// ARGV[1] = '1' when the key must be absent, ARGV[2] = expected value,
/// ARGV[3] = new value, ARGV[4] = ttl in ms
static COMPARE_AND_SWAP: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
            local current = redis.call('GET', KEYS[1])
            if ARGV[1] == '1' then
                if current then
                    return 0
                end
            elseif current ~= ARGV[2] then
                return 0
            end
            redis.call('SET', KEYS[1], ARGV[3], 'PX', ARGV[4])
            return 1
        "#,
    )
});

/// Redis connection pool.
///
/// `ConnectionManager` multiplexes and reconnects on its own, so the pool
/// hands out clones round-robin instead of checking connections in and out.
#[derive(Clone)]
pub struct RedisPool {
    connections: Arc<Vec<ConnectionManager>>,
    next: Arc<AtomicUsize>,
    config: RedisConfig,
    commands_failed: Arc<AtomicU64>,
}

/// Health check status for Redis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisHealth {
    pub is_healthy: bool,
    pub latency_ms: u64,
    pub total_connections: u32,
    pub commands_failed: u64,
    pub error: Option<String>,
}

impl RedisPool {
    /// Create a new Redis connection pool with retry logic
    #[instrument(skip(config))]
    pub async fn new(config: RedisConfig) -> Result<Self, RedisError> {
        config.validate().map_err(|e| {
            error!("Invalid Redis configuration: {}", e);
            RedisError::from((
                redis::ErrorKind::InvalidClientConfig,
                "Invalid configuration",
            ))
        })?;

        info!(
            url = %mask_redis_url(&config.redis_url),
            pool_size = config.pool_size,
            "Initializing Redis connection pool"
        );

        let client = Client::open(config.redis_url.as_str())?;

        let mut connections = Vec::with_capacity(config.pool_size as usize);
        for i in 0..config.pool_size {
            match create_connection_with_retry(&client, &config).await {
                Ok(conn) => connections.push(conn),
                Err(e) if connections.is_empty() => return Err(e),
                Err(e) => {
                    warn!("Failed to create connection {}: {}", i, e);
                },
            }
        }

        info!("Redis pool initialized with {} connections", connections.len());

        Ok(Self {
            connections: Arc::new(connections),
            next: Arc::new(AtomicUsize::new(0)),
            config,
            commands_failed: Arc::new(AtomicU64::new(0)),
        })
    }

    fn connection(&self) -> ConnectionManager {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx].clone()
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Run a command under the configured command timeout
    async fn run<T, Fut>(&self, fut: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let result = match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => StoreError::Redis(e),
            Err(_) => StoreError::Timeout(self.config.command_timeout),
        };

        self.commands_failed.fetch_add(1, Ordering::Relaxed);
        error!("Redis command failed: {}", result);
        Err(result)
    }

    /// Perform a health check on Redis
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> RedisHealth {
        let start = Instant::now();
        let result = self.ping().await;

        RedisHealth {
            is_healthy: result.is_ok(),
            latency_ms: start.elapsed().as_millis() as u64,
            total_connections: self.connections.len() as u32,
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            error: result.err().map(|e| e.to_string()),
        }
    }
}

/// Create a connection with retry logic
async fn create_connection_with_retry(
    client: &Client,
    config: &RedisConfig,
) -> Result<ConnectionManager, RedisError> {
    let mut retry_count = 0;
    let mut delay = config.retry_delay;

    loop {
        let attempt = tokio::time::timeout(
            config.connection_timeout,
            ConnectionManager::new(client.clone()),
        )
        .await
        .unwrap_or_else(|_| {
            Err(RedisError::from((
                redis::ErrorKind::IoError,
                "Connection timeout",
            )))
        });

        match attempt {
            Ok(conn) => return Ok(conn),
            Err(e) if retry_count < config.retry_attempts => {
                warn!(
                    "Failed to create Redis connection (attempt {}/{}): {}",
                    retry_count + 1,
                    config.retry_attempts,
                    e
                );

                sleep(delay).await;

                // Exponential backoff with jitter and maximum delay cap
                let jitter = thread_rng().gen_range(0..100);
                delay = std::cmp::min(delay * 2 + Duration::from_millis(jitter), MAX_RETRY_DELAY);
                retry_count += 1;
            },
            Err(e) => {
                error!(
                    "Failed to create Redis connection after {} attempts",
                    config.retry_attempts
                );
                return Err(e);
            },
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisPool {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection();
        let key = self.key(key);
        self.run(async move {
            redis::cmd("GET")
                .arg(&key)
                .query_async::<Option<String>>(&mut conn)
                .await
        })
        .await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection();
        let key = self.key(key);
        let value = value.to_string();
        self.run(async move {
            redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut conn = self.connection();
        let key = self.key(key);
        self.run(async move {
            INCR_WITH_EXPIRY
                .key(&key)
                .arg(ttl_millis(ttl))
                .invoke_async(&mut conn)
                .await
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection();
        let key = self.key(key);
        let must_be_absent = if expected.is_none() { "1" } else { "0" };
        let expected = expected.unwrap_or_default().to_string();
        let new = new.to_string();

        let swapped: i64 = self
            .run(async move {
                COMPARE_AND_SWAP
                    .key(&key)
                    .arg(must_be_absent)
                    .arg(&expected)
                    .arg(&new)
                    .arg(ttl_millis(ttl))
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        Ok(swapped == 1)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection();
        let key = self.key(key);
        self.run(async move {
            redis::cmd("DEL")
                .arg(&key)
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection();
        self.run(async move {
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map(|_| ())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Mask Redis URL for logging
pub fn mask_redis_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let scheme = parsed.scheme();
        let host = parsed.host_str().unwrap_or("***");
        let port = parsed.port().unwrap_or(6379);

        if !parsed.username().is_empty() || parsed.password().is_some() {
            format!("{}://***:***@{}:{}", scheme, host, port)
        } else {
            format!("{}://{}:{}", scheme, host, port)
        }
    } else {
        // Don't expose any part of invalid URL
        "redis://***:***@***:***".to_string()
    }
}
