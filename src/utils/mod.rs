// Utility modules for the hospital access core

pub mod auth_errors;
pub mod clock;
pub mod password;

pub use auth_errors::{log_auth_failure, AuthError, AuthErrorResponse};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use password::{hash_password, verify_password, PasswordConfig, PasswordError};
