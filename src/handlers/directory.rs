// User directory handlers: role catalogue and principal listing

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::{debug, error};

use crate::{
    app::AppState,
    middleware::AuthenticatedUser,
    models::principal::{Principal, Role},
    utils::auth_errors::AuthError,
};

#[derive(Debug, Serialize)]
pub struct RoleInfo {
    pub name: Role,
    pub description: &'static str,
}

/// GET /roles - Every role the system knows about
pub async fn list_roles(user: AuthenticatedUser) -> Json<Vec<RoleInfo>> {
    debug!(user_id = %user.user_id, "Listing roles");
    Json(
        Role::ALL
            .iter()
            .map(|role| RoleInfo {
                name: *role,
                description: role.description(),
            })
            .collect(),
    )
}

/// GET /users - All principals; restricted to user-management roles by the router
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Principal>>, AuthError> {
    debug!(user_id = %user.user_id, role = %user.role, "Listing users");
    let principals = state.principals.list().await.map_err(|e| {
        error!(error = %e, "Failed to list users");
        AuthError::InternalError
    })?;
    Ok(Json(principals))
}
