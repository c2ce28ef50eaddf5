// Configuration modules for the hospital access core

pub mod permissions;
pub mod rate_limit;

pub use permissions::PermissionConfig;
pub use rate_limit::{
    sanitize_path, FailurePolicy, RateLimitRule, RateLimitingConfig, ResolvedRoute,
};
