// Centralized Rate Limiting Configuration
// Per-route fixed-window rules; routes resolve to a rule key ("route class")

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::app_config::{env_bool_or, env_or, ConfigError};

/// Longest accepted window: one year
pub const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 60 * 60;

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid regex")
});

/// Fixed-window limit: at most `max_requests` per `window_seconds`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }

    /// Window length in milliseconds, `None` if it does not fit an `i64`
    pub fn window_millis(&self) -> Option<i64> {
        i64::try_from(self.window_seconds).ok()?.checked_mul(1000)
    }
}

/// What to do with a request when the shared store cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Let the request through and log a warning
    FailOpen,
    /// Reject with 503
    FailClosed,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail_open" | "open" => Ok(FailurePolicy::FailOpen),
            "fail_closed" | "closed" => Ok(FailurePolicy::FailClosed),
            other => Err(format!("unknown failure policy: {}", other)),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailOpen => f.write_str("fail_open"),
            FailurePolicy::FailClosed => f.write_str("fail_closed"),
        }
    }
}

/// Rule a request resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// Rule key the request matched, or the sanitised path for the default rule
    pub route_class: String,
    pub rule: RateLimitRule,
}

/// Global rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    pub enabled: bool,

    /// Rule for routes without a specific entry
    pub default: RateLimitRule,

    /// Rules keyed by `"METHOD /path"` or `"/path"`
    pub endpoints: HashMap<String, RateLimitRule>,

    /// Paths that bypass limiting entirely
    pub skip_paths: Vec<String>,

    pub failure_policy: FailurePolicy,

    /// Use the first `X-Forwarded-For` hop as the client identifier
    pub trust_forwarded_for: bool,

    /// Bound applied to every store call made by the limiter
    pub store_timeout: Duration,

    /// Compare-and-swap retries before giving up on a contended key
    pub max_cas_attempts: u32,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        let endpoints = [
            // Login and refresh share the strict auth budget
            ("/auth", RateLimitRule::new(5, 300)),
            ("/auth/verify", RateLimitRule::new(60, 60)),
            ("/auth/me", RateLimitRule::new(60, 60)),
            ("/users", RateLimitRule::new(100, 60)),
            ("/users/{id}", RateLimitRule::new(50, 60)),
            ("/users/{uuid}", RateLimitRule::new(50, 60)),
            ("POST /users", RateLimitRule::new(10, 300)),
            ("/roles", RateLimitRule::new(80, 60)),
            ("/roles/{id}", RateLimitRule::new(40, 60)),
            ("POST /roles", RateLimitRule::new(15, 300)),
            ("PUT /roles/{id}", RateLimitRule::new(20, 300)),
            ("DELETE /roles/{id}", RateLimitRule::new(10, 300)),
            ("/health", RateLimitRule::new(500, 60)),
            ("/health/detailed", RateLimitRule::new(100, 60)),
            ("/health/ready", RateLimitRule::new(1000, 60)),
            ("/health/live", RateLimitRule::new(1000, 60)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            enabled: true,
            default: RateLimitRule::new(200, 60),
            endpoints,
            skip_paths: ["/docs", "/openapi.json", "/redoc", "/favicon.ico"]
                .into_iter()
                .map(String::from)
                .collect(),
            failure_policy: FailurePolicy::FailOpen,
            trust_forwarded_for: false,
            store_timeout: Duration::from_millis(250),
            max_cas_attempts: 64,
        }
    }
}

/// Replace numeric segments with `{id}` and UUID segments with `{uuid}`
pub fn sanitize_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if NUMERIC_SEGMENT.is_match(segment) {
                "{id}"
            } else if UUID_SEGMENT.is_match(segment) {
                "{uuid}"
            } else {
                segment
            }
        })
        .collect();

    format!("/{}", segments.join("/"))
}

impl RateLimitingConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.enabled = env_bool_or("RATE_LIMIT_ENABLED", config.enabled)?;
        config.default = RateLimitRule::new(
            env_or("RATE_LIMIT_DEFAULT_MAX", config.default.max_requests)?,
            env_or("RATE_LIMIT_DEFAULT_WINDOW", config.default.window_seconds)?,
        );

        let auth = config.endpoints.get("/auth").copied().unwrap_or(config.default);
        config.endpoints.insert(
            "/auth".to_string(),
            RateLimitRule::new(
                env_or("RATE_LIMIT_AUTH_MAX", auth.max_requests)?,
                env_or("RATE_LIMIT_AUTH_WINDOW", auth.window_seconds)?,
            ),
        );

        config.failure_policy = env_or("RATE_LIMIT_FAIL_POLICY", config.failure_policy)?;
        config.trust_forwarded_for =
            env_bool_or("RATE_LIMIT_TRUST_FORWARDED_FOR", config.trust_forwarded_for)?;
        config.max_cas_attempts = env_or("RATE_LIMIT_CAS_ATTEMPTS", config.max_cas_attempts)?;
        config.store_timeout = Duration::from_millis(env_or(
            "RATE_LIMIT_STORE_TIMEOUT_MS",
            config.store_timeout.as_millis() as u64,
        )?);

        config
            .validate()
            .map_err(|message| ConfigError::InvalidValue("RATE_LIMIT_*".to_string(), message))?;

        Ok(config)
    }

    pub fn should_skip(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|p| p == path)
    }

    /// Resolve the rule for a request.
    ///
    /// Lookup order: `"METHOD path"`, `path`, longest path-prefix entry on a
    /// segment boundary, then the default rule.
    pub fn resolve(&self, method: &str, path: &str) -> ResolvedRoute {
        let path = sanitize_path(path);

        let method_key = format!("{} {}", method.to_uppercase(), path);
        if let Some(rule) = self.endpoints.get(&method_key) {
            return ResolvedRoute {
                route_class: method_key,
                rule: *rule,
            };
        }

        if let Some(rule) = self.endpoints.get(&path) {
            return ResolvedRoute {
                route_class: path,
                rule: *rule,
            };
        }

        let prefix_match = self
            .endpoints
            .iter()
            .filter(|(key, _)| key.starts_with('/') && is_segment_prefix(key, &path))
            .max_by_key(|(key, _)| key.len());

        if let Some((key, rule)) = prefix_match {
            return ResolvedRoute {
                route_class: key.clone(),
                rule: *rule,
            };
        }

        ResolvedRoute {
            route_class: path,
            rule: self.default,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default.max_requests == 0 {
            return Err("Default max_requests cannot be zero".to_string());
        }

        if self.default.window_seconds == 0 {
            return Err("Default window_seconds cannot be zero".to_string());
        }

        if self.default.window_seconds > MAX_WINDOW_SECONDS {
            return Err(format!(
                "Default window_seconds cannot exceed {}",
                MAX_WINDOW_SECONDS
            ));
        }

        for (endpoint, rule) in &self.endpoints {
            if rule.max_requests == 0 {
                return Err(format!("Endpoint {} max_requests cannot be zero", endpoint));
            }

            if rule.window_seconds == 0 {
                return Err(format!(
                    "Endpoint {} window_seconds cannot be zero",
                    endpoint
                ));
            }

            if rule.window_seconds > MAX_WINDOW_SECONDS {
                return Err(format!(
                    "Endpoint {} window_seconds cannot exceed {}",
                    endpoint, MAX_WINDOW_SECONDS
                ));
            }
        }

        if self.store_timeout.is_zero() {
            return Err("Store timeout cannot be zero".to_string());
        }

        if self.max_cas_attempts == 0 {
            return Err("CAS attempts cannot be zero".to_string());
        }

        Ok(())
    }
}

fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}
