// Middleware modules for the hospital access core
// Request pipeline: rate limit -> token verification -> role check -> handler

pub mod auth;
pub mod auth_middleware;
pub mod cors;
pub mod guard;
pub mod rate_limit;

pub use auth::AuthenticatedUser;
pub use auth_middleware::{guard_middleware, RouteGuard};
pub use cors::{cors_middleware, CorsPolicy};
pub use guard::{AccessGuard, GuardError};
pub use rate_limit::{rate_limit_middleware, ClientIdentity};
