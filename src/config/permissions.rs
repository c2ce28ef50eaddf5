// Role requirements for the protected route groups

use crate::models::principal::{Role, RoleSet};

pub struct PermissionConfig;

impl PermissionConfig {
    /// Roles allowed to read the user directory
    pub fn user_management_roles() -> RoleSet {
        RoleSet::of(&[Role::Developer, Role::Admin])
    }

    /// Roles allowed on routes that only need a valid session
    pub fn authenticated_roles() -> RoleSet {
        RoleSet::any_authenticated()
    }
}
