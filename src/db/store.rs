// Shared key-value store abstraction used by the rate limiter and health checks

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value operations the access core needs from its shared cache.
///
/// Every mutating call that takes a `ttl` sets a millisecond expiry on the
/// key. Implementations must make `incr_with_expiry` and `compare_and_swap`
/// atomic with respect to concurrent callers on the same key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), StoreError>;

    /// Increment a counter, setting `ttl` only when the key is created
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` means the key must be absent). Returns whether the write happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Short backend name for health output
    fn backend_name(&self) -> &'static str;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// Millisecond TTL for a store call, never below 1ms
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}
