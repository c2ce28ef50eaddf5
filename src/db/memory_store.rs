// Process-local store for tests and single-instance development

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::store::{ttl_millis, KeyValueStore, StoreError};
use crate::utils::clock::SharedClock;

/// How often the server sweeps expired entries out of the memory backend
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: i64,
}

/// Mutex-guarded map with per-entry expiry. Expiry is evaluated lazily
/// against the injected clock, so a `ManualClock` fully controls it.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: SharedClock,
}

impl MemoryStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        self.clock.now_millis() + ttl_millis(ttl) as i64
    }

    /// Live value for `key`, dropping it first if it has expired
    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now_ms: i64,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| e.expires_at_ms <= now_ms) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now_millis();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at_ms > now);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "Purged expired memory store entries");
        }
        Ok(purged)
    }

    /// Sweep expired entries every `every` until the store is dropped.
    ///
    /// Lazy expiry alone only reclaims keys that are touched again.
    pub fn spawn_purge_task(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Memory store dropped, stopping purge task");
                    break;
                };
                if let Err(e) = store.purge_expired() {
                    warn!(error = %e, "Failed to purge memory store");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_millis();
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, now).map(|e| e.value.clone()))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at_ms = self.expiry(ttl);
        self.lock()?.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let now = self.clock.now_millis();
        let expires_at_ms = self.expiry(ttl);
        let mut entries = self.lock()?;

        match Self::live(&mut entries, key, now) {
            Some(entry) => {
                let current: i64 = entry.value.parse().map_err(|_| {
                    StoreError::Unavailable(format!("value at {} is not an integer", key))
                })?;
                let next = current + 1;
                entry.value = next.to_string();
                Ok(next)
            },
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at_ms,
                    },
                );
                Ok(1)
            },
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        let expires_at_ms = self.expiry(ttl);
        let mut entries = self.lock()?;

        let current = Self::live(&mut entries, key, now).map(|e| e.value.as_str());
        if current != expected {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: new.to_string(),
                expires_at_ms,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
