// Services module for the hospital access core
// Token codec, credential verification and rate limiting

pub mod credentials;
pub mod rate_limit;
pub mod token;

// Re-export commonly used services
pub use credentials::{CredentialError, CredentialVerifier};
pub use rate_limit::{
    RateLimitDecision, RateLimitError, RateLimitKey, RateLimitStatus, RateLimiter, WindowRecord,
};
pub use token::{TokenCodec, TokenConfig, TokenError};
