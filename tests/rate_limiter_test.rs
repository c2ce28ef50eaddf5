// Rate limiter behaviour against the shared store: window lifecycle,
// concurrent admission and store failures

use async_trait::async_trait;
use hospital_access_core::{
    config::RateLimitRule,
    db::{KeyValueStore, MemoryStore, SharedStore, StoreError},
    services::rate_limit::{RateLimitError, RateLimitKey, RateLimiter},
    utils::clock::{ManualClock, SharedClock},
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

fn memory_limiter(clock: &ManualClock) -> (RateLimiter, SharedStore) {
    let shared: SharedClock = Arc::new(clock.clone());
    let store: SharedStore = Arc::new(MemoryStore::new(shared.clone()));
    (
        RateLimiter::new(store.clone(), shared, Duration::from_millis(250), 64),
        store,
    )
}

#[tokio::test]
async fn test_window_admits_limit_then_resets() {
    let clock = ManualClock::new(1_700_000_000_000);
    let (limiter, _) = memory_limiter(&clock);
    let key = RateLimitKey::new("ip_10.0.0.1", "/roles");
    let rule = RateLimitRule::new(3, 60);

    let mut outcomes = Vec::new();
    for _ in 0..5 {
        outcomes.push(limiter.check_and_increment(&key, &rule).await.is_ok());
    }
    assert_eq!(outcomes, vec![true, true, true, false, false]);

    // Still inside the window one millisecond before it closes
    clock.advance(Duration::from_millis(59_999));
    assert!(limiter.check_and_increment(&key, &rule).await.is_err());

    clock.advance(Duration::from_millis(1));
    let decision = limiter.check_and_increment(&key, &rule).await.unwrap();
    assert_eq!(decision.count, 1);
    assert_eq!(decision.remaining, 2);
    assert_eq!(decision.reset_at_ms, 1_700_000_060_000 + 60_000);
}

#[tokio::test]
async fn test_keys_are_independent() {
    let clock = ManualClock::new(1_700_000_000_000);
    let (limiter, _) = memory_limiter(&clock);
    let rule = RateLimitRule::new(1, 60);

    let a_roles = RateLimitKey::new("ip_10.0.0.1", "/roles");
    let a_users = RateLimitKey::new("ip_10.0.0.1", "/users");
    let b_roles = RateLimitKey::new("ip_10.0.0.2", "/roles");

    assert!(limiter.check_and_increment(&a_roles, &rule).await.is_ok());
    assert!(limiter.check_and_increment(&a_users, &rule).await.is_ok());
    assert!(limiter.check_and_increment(&b_roles, &rule).await.is_ok());
    assert!(limiter.check_and_increment(&a_roles, &rule).await.is_err());
}

#[tokio::test]
async fn test_rejections_leave_counter_untouched() {
    let clock = ManualClock::new(1_700_000_000_000);
    let (limiter, store) = memory_limiter(&clock);
    let key = RateLimitKey::new("ip_10.0.0.1", "/auth");
    let rule = RateLimitRule::new(2, 300);

    limiter.check_and_increment(&key, &rule).await.unwrap();
    limiter.check_and_increment(&key, &rule).await.unwrap();
    for _ in 0..3 {
        limiter.check_and_increment(&key, &rule).await.unwrap_err();
    }

    let raw = store.get("rate_limit:/auth:ip_10.0.0.1").await.unwrap();
    assert_eq!(raw.as_deref(), Some("2:1700000000000"));
    assert_eq!(limiter.rejected_count("/auth").await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_admit_exactly_limit() {
    let clock = ManualClock::new(1_700_000_000_000);
    let (limiter, _) = memory_limiter(&clock);
    let limiter = Arc::new(limiter);
    let key = RateLimitKey::new("ip_10.0.0.9", "/users");
    let rule = RateLimitRule::new(10, 60);

    let mut tasks = JoinSet::new();
    for _ in 0..50 {
        let limiter = limiter.clone();
        let key = key.clone();
        tasks.spawn(async move { limiter.check_and_increment(&key, &rule).await });
    }

    let mut admitted = 0;
    let mut limited = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => admitted += 1,
            Err(RateLimitError::RateLimited { .. }) => limited += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(admitted, 10);
    assert_eq!(limited, 40);

    let status = limiter.status(&key, &rule).await.unwrap();
    assert_eq!(status.count, 10);
    assert_eq!(status.remaining, 0);
}

/// Store whose calls never complete within the limiter's timeout
struct StallingStore;

#[async_trait]
impl KeyValueStore for StallingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }

    async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn incr_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<i64, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(1)
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _expected: Option<&str>,
        _new: &str,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(true)
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "stalling"
    }
}

#[tokio::test]
async fn test_stalled_store_is_unavailable_not_limited() {
    let clock: SharedClock = Arc::new(ManualClock::new(0));
    let limiter = RateLimiter::new(Arc::new(StallingStore), clock, Duration::from_millis(50), 8);

    let started = std::time::Instant::now();
    let result = limiter
        .check_and_increment(&RateLimitKey::new("ip_1", "/roles"), &RateLimitRule::new(5, 60))
        .await;

    assert!(matches!(result, Err(RateLimitError::Unavailable(_))));
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Store that always loses the compare-and-swap race
struct ContendedStore {
    attempts: AtomicU32,
}

#[async_trait]
impl KeyValueStore for ContendedStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn incr_with_expiry(&self, _key: &str, _ttl: Duration) -> Result<i64, StoreError> {
        Ok(1)
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _expected: Option<&str>,
        _new: &str,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "contended"
    }
}

#[tokio::test]
async fn test_endless_contention_gives_up() {
    let store = Arc::new(ContendedStore {
        attempts: AtomicU32::new(0),
    });
    let clock: SharedClock = Arc::new(ManualClock::new(0));
    let limiter = RateLimiter::new(store.clone(), clock, Duration::from_millis(250), 4);

    let result = limiter
        .check_and_increment(&RateLimitKey::new("ip_1", "/roles"), &RateLimitRule::new(5, 60))
        .await;

    assert!(matches!(result, Err(RateLimitError::Unavailable(_))));
    assert_eq!(store.attempts.load(Ordering::SeqCst), 4);
}
