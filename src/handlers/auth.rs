// Authentication handlers: login, refresh, token introspection, current user

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};
use axum_extra::{headers::UserAgent, TypedHeader};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    app::AppState,
    db::normalize_email,
    middleware::{auth::bearer_token, AuthenticatedUser, ClientIdentity},
    models::{
        auth::{
            AccessTokenResponse, LoginRequest, RefreshTokenRequest, TokenPairResponse,
            TokenVerifyResponse,
        },
        principal::Principal,
    },
    utils::auth_errors::{log_auth_failure, AuthError},
};

const TOKEN_TYPE: &str = "bearer";

/// POST /auth/login - Exchange email and password for an access/refresh token pair
#[instrument(skip(state, user_agent, login_req))]
pub async fn login(
    State(state): State<AppState>,
    client: ClientIdentity,
    user_agent: Option<TypedHeader<UserAgent>>,
    Json(login_req): Json<LoginRequest>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    let user_agent = user_agent.map(|TypedHeader(ua)| ua.to_string());
    let email = normalize_email(&login_req.email);

    if email.is_empty() || login_req.password.is_empty() {
        return Err(AuthError::ValidationError(
            "Email and password are required".to_string(),
        ));
    }

    let principal = match state
        .credentials
        .authenticate(&email, &login_req.password)
        .await
    {
        Ok(principal) => principal,
        Err(e) => {
            let auth_error = AuthError::from(e);
            log_auth_failure(&email, client.ip(), &auth_error, user_agent.as_deref());
            return Err(auth_error);
        },
    };

    let access_token = state.token_codec.issue(&principal)?;
    let refresh_token = state.token_codec.issue_refresh(&principal)?;

    info!(user_id = %principal.id, role = %principal.role, "Login successful");

    Ok(Json(TokenPairResponse {
        access_token,
        refresh_token,
        token_type: TOKEN_TYPE.to_string(),
        expires_in: state.token_codec.access_ttl_seconds(),
        user: principal,
    }))
}

/// POST /auth/refresh - Issue a new access token from a refresh token.
/// The role is re-read from the user directory, so role changes apply here.
#[instrument(skip_all)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<AccessTokenResponse>, AuthError> {
    let claims = state.token_codec.verify_refresh(&request.refresh_token)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    let record = state.principals.find_by_id(user_id).await.map_err(|e| {
        error!(error = %e, "User directory lookup failed during refresh");
        AuthError::InternalError
    })?;

    let principal: Principal = match record {
        Some(record) if record.is_active => record.principal,
        _ => {
            info!(user_id = %user_id, "Refresh rejected for missing or disabled account");
            return Err(AuthError::InvalidToken);
        },
    };

    let access_token = state.token_codec.issue(&principal)?;

    Ok(Json(AccessTokenResponse {
        access_token,
        token_type: TOKEN_TYPE.to_string(),
        expires_in: state.token_codec.access_ttl_seconds(),
    }))
}

/// GET /auth/verify - Describe the presented access token
pub async fn verify_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenVerifyResponse>, AuthError> {
    let token = bearer_token(&headers)?;
    let claims = state.token_codec.verify(token)?;

    Ok(Json(TokenVerifyResponse {
        valid: true,
        user_id: claims.sub,
        role: claims.role,
        expires_at: claims.exp,
    }))
}

/// GET /auth/me - Current principal as stored in the user directory
pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Principal>, AuthError> {
    let record = state.principals.find_by_id(user.user_id).await.map_err(|e| {
        error!(error = %e, "User directory lookup failed");
        AuthError::InternalError
    })?;

    match record {
        Some(record) if record.is_active => Ok(Json(record.principal)),
        _ => Err(AuthError::InvalidToken),
    }
}
