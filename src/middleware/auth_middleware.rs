// Authorization middleware for protected route groups
// Verifies the bearer token, checks the group's roles, and injects AuthenticatedUser

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::middleware::auth::{bearer_token, AuthenticatedUser};
use crate::middleware::guard::AccessGuard;
use crate::models::principal::RoleSet;
use crate::utils::auth_errors::AuthError;

/// Middleware state: the shared guard plus the roles one route group accepts
#[derive(Debug, Clone)]
pub struct RouteGuard {
    pub guard: AccessGuard,
    pub required: RoleSet,
}

impl RouteGuard {
    pub fn new(guard: AccessGuard, required: RoleSet) -> Self {
        Self { guard, required }
    }
}

/// Middleware function that authorizes the request and adds AuthenticatedUser to extensions
pub async fn guard_middleware(
    State(route): State<RouteGuard>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match bearer_token(request.headers()) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let claims = match route.guard.authorize(token, &route.required) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(
                path = %request.uri().path(),
                error = %e,
                "Request rejected by access guard"
            );
            return AuthError::from(e).into_response();
        },
    };

    let user = match AuthenticatedUser::from_claims(claims) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}
