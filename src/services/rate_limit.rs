// Rate Limiting Service for the hospital access core
// Fixed-window counters on the shared store, updated with compare-and-swap

use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::{RateLimitRule, RateLimitingConfig};
use crate::db::{SharedStore, StoreError};
use crate::utils::clock::SharedClock;

/// Rejection statistics are kept per route class for this long
const REJECTION_STATS_TTL: Duration = Duration::from_secs(3600);

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateLimitError {
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        limit: u32,
        reset_at_ms: i64,
    },

    /// The store could not be consulted. Never reported as `RateLimited`.
    #[error("Rate limiter unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// KEYS AND RECORDS
// =============================================================================

/// Counter identity: one window per client per route class
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub client: String,
    pub route_class: String,
}

impl RateLimitKey {
    pub fn new(client: impl Into<String>, route_class: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            route_class: route_class.into(),
        }
    }

    pub fn store_key(&self) -> String {
        format!("rate_limit:{}:{}", self.route_class, self.client)
    }
}

/// Stored counter, encoded as `"{count}:{window_start_ms}"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRecord {
    pub count: u32,
    pub window_start_ms: i64,
}

impl WindowRecord {
    pub fn parse(raw: &str) -> Option<Self> {
        let (count, start) = raw.split_once(':')?;
        Some(Self {
            count: count.parse().ok()?,
            window_start_ms: start.parse().ok()?,
        })
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.count, self.window_start_ms)
    }
}

/// Outcome of an admitted request, used for response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub limit: u32,
    pub remaining: u32,
    /// Requests counted in the current window, this one included
    pub count: u32,
    /// Window end (Unix epoch milliseconds)
    pub reset_at_ms: i64,
}

/// Read-only view of a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub count: u32,
    pub remaining: u32,
    /// `None` when no window is open
    pub reset_at_ms: Option<i64>,
}

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Fixed-window rate limiter.
///
/// The window opens on the first request for a key and lasts
/// `rule.window_seconds`. Increments are written with compare-and-swap so
/// concurrent requests on one key are neither lost nor double counted.
#[derive(Clone)]
pub struct RateLimiter {
    store: SharedStore,
    clock: SharedClock,
    timeout: Duration,
    max_cas_attempts: u32,
}

impl RateLimiter {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        timeout: Duration,
        max_cas_attempts: u32,
    ) -> Self {
        Self {
            store,
            clock,
            timeout,
            max_cas_attempts: max_cas_attempts.max(1),
        }
    }

    pub fn from_config(store: SharedStore, clock: SharedClock, config: &RateLimitingConfig) -> Self {
        Self::new(store, clock, config.store_timeout, config.max_cas_attempts)
    }

    /// Admit or reject one request for `key` under `rule`.
    ///
    /// Rejections do not write to the counter.
    #[instrument(skip(self, rule), fields(route_class = %key.route_class, limit = rule.max_requests))]
    pub async fn check_and_increment(
        &self,
        key: &RateLimitKey,
        rule: &RateLimitRule,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let store_key = key.store_key();
        let window_ms = window_millis(rule)?;

        for attempt in 1..=self.max_cas_attempts {
            let raw = self.call("get", self.store.get(&store_key)).await?;
            let now = self.clock.now_millis();

            let record = match raw.as_deref().and_then(WindowRecord::parse) {
                Some(record) if now.saturating_sub(record.window_start_ms) < window_ms => record,
                _ => WindowRecord {
                    count: 0,
                    window_start_ms: now,
                },
            };
            let reset_at_ms = record.window_start_ms.saturating_add(window_ms);

            if record.count >= rule.max_requests {
                self.note_rejection(&key.route_class).await;
                return Err(RateLimitError::RateLimited {
                    retry_after: Duration::from_millis((reset_at_ms - now).max(0) as u64),
                    limit: rule.max_requests,
                    reset_at_ms,
                });
            }

            let next = WindowRecord {
                count: record.count + 1,
                ..record
            };
            let ttl = Duration::from_millis((reset_at_ms - now).max(1) as u64);

            let swapped = self
                .call(
                    "compare_and_swap",
                    self.store
                        .compare_and_swap(&store_key, raw.as_deref(), &next.encode(), ttl),
                )
                .await?;

            if swapped {
                return Ok(RateLimitDecision {
                    limit: rule.max_requests,
                    remaining: rule.max_requests - next.count,
                    count: next.count,
                    reset_at_ms,
                });
            }

            debug!(attempt, "Counter changed concurrently, retrying");
        }

        warn!(
            attempts = self.max_cas_attempts,
            "Gave up on contended rate limit counter"
        );
        Err(RateLimitError::Unavailable(format!(
            "counter still contended after {} attempts",
            self.max_cas_attempts
        )))
    }

    /// Current counter state without counting a request
    pub async fn status(
        &self,
        key: &RateLimitKey,
        rule: &RateLimitRule,
    ) -> Result<RateLimitStatus, RateLimitError> {
        let raw = self.call("get", self.store.get(&key.store_key())).await?;
        let now = self.clock.now_millis();
        let window_ms = window_millis(rule)?;

        let open = raw
            .as_deref()
            .and_then(WindowRecord::parse)
            .filter(|r| now.saturating_sub(r.window_start_ms) < window_ms);

        let count = open.map(|r| r.count).unwrap_or(0);
        Ok(RateLimitStatus {
            limit: rule.max_requests,
            count,
            remaining: rule.max_requests.saturating_sub(count),
            reset_at_ms: open.map(|r| r.window_start_ms.saturating_add(window_ms)),
        })
    }

    /// Drop the counter for `key`, opening a fresh window on the next request
    #[instrument(skip(self), fields(route_class = %key.route_class))]
    pub async fn clear(&self, key: &RateLimitKey) -> Result<(), RateLimitError> {
        self.call("delete", self.store.delete(&key.store_key()))
            .await
    }

    /// Rejections recorded for a route class during the current stats period
    pub async fn rejected_count(&self, route_class: &str) -> Result<u64, RateLimitError> {
        let raw = self
            .call("get", self.store.get(&rejection_key(route_class)))
            .await?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    async fn note_rejection(&self, route_class: &str) {
        let result = self
            .call(
                "incr_with_expiry",
                self.store
                    .incr_with_expiry(&rejection_key(route_class), REJECTION_STATS_TTL),
            )
            .await;

        if let Err(e) = result {
            debug!(error = %e, "Failed to record rate limit rejection");
        }
    }

    /// Run one store call under the limiter's timeout
    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, RateLimitError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(op, error = %e, "Rate limit store call failed");
                Err(RateLimitError::Unavailable(e.to_string()))
            },
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Rate limit store call timed out");
                Err(RateLimitError::Unavailable(format!(
                    "{} timed out after {:?}",
                    op, self.timeout
                )))
            },
        }
    }
}

fn window_millis(rule: &RateLimitRule) -> Result<i64, RateLimitError> {
    rule.window_millis().ok_or_else(|| {
        warn!(window_seconds = rule.window_seconds, "Rate limit window out of range");
        RateLimitError::Unavailable(format!(
            "window of {}s is out of range",
            rule.window_seconds
        ))
    })
}

fn rejection_key(route_class: &str) -> String {
    format!("rate_limit:rejected:{}", route_class)
}
