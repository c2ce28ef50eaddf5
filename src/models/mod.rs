pub mod auth;
pub mod principal;

// Re-export common types
pub use auth::*;
pub use principal::{Principal, PrincipalRecord, Role, RoleSet, UnknownRole};
