//! Account and session endpoints, plus the authenticated-caller extractor.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::{validate_password, validate_register_request};
use crate::auth::jwt::{DEFAULT_GROUPS, LOGIN_RIGHTS};
use crate::auth::{access_cookie, extract_token, removal_cookie, Claims, TokenSubject};
use crate::db::{LoginRequest, LoginResponse, RegisterRequest, User, UserResponse};
use crate::services::UserService;
use crate::AppState;

/// The verified claims of the caller's access token
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or_else(|| ApiError::unauthorized("Not authenticated").with_bearer_challenge())?;

        state.tokens.verify(&token).map(AuthUser).map_err(|_| {
            ApiError::unauthorized("Invalid or expired token").with_bearer_challenge()
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub user_id: i64,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeactivateRequest {
    pub user_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub rights: Vec<String>,
    pub groups: Vec<String>,
}

/// Issue an access token for `user`, returned in the body and as a cookie
pub(crate) fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let subject = TokenSubject::new(user.id, user.email.clone())
        .with_rights(LOGIN_RIGHTS)
        .with_groups(DEFAULT_GROUPS);
    let ttl = state.tokens.default_ttl();
    let token = state.tokens.issue(&subject, ttl)?;

    let cookie = access_cookie(
        &state.config.auth.cookie_name,
        &token,
        ttl,
        state.config.auth.cookie_secure,
    );

    tracing::info!(user_id = user.id, "Session started");

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            access_token: token,
            token_type: "bearer".to_string(),
            user: user.into(),
        }),
    ))
}

/// Log in with email and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let users = UserService::new(state.db.clone());
    let user = users
        .authenticate(&req.email, &req.password)
        .await?
        .ok_or_else(|| {
            tracing::warn!(email = %req.email, "Failed login attempt");
            ApiError::unauthorized("Invalid email or password").with_bearer_challenge()
        })?;

    start_session(&state, jar, user)
}

/// Register a new account
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_register_request(&req)?;

    let users = UserService::new(state.db.clone());
    let user = users.register(&req).await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Set a new password for the caller's own account
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if claims.user_id != req.user_id {
        return Err(ApiError::forbidden("You can only reset your own password"));
    }
    validate_password(&req.new_password)
        .map_err(|msg| ApiError::validation_field("new_password", msg))?;

    let users = UserService::new(state.db.clone());
    let user = users
        .reset_password(req.user_id, &req.new_password)
        .await?
        .ok_or_else(ApiError::user_not_found)?;

    Ok(Json(user.into()))
}

/// Deactivate the caller's own account
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(req): Json<DeactivateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if claims.user_id != req.user_id {
        return Err(ApiError::forbidden("You can only deactivate your own account"));
    }

    let users = UserService::new(state.db.clone());
    let user = users
        .deactivate(req.user_id)
        .await?
        .ok_or_else(ApiError::user_not_found)?;

    Ok(Json(user.into()))
}

/// Get the current user along with the token's rights and groups
pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let users = UserService::new(state.db.clone());
    let user = users
        .get(claims.user_id)
        .await?
        .ok_or_else(ApiError::user_not_found)?;

    Ok(Json(MeResponse {
        user: user.into(),
        rights: claims.rights,
        groups: claims.groups,
    }))
}

/// Clear the access-token cookie
pub async fn logout(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    tracing::info!(user_id = claims.user_id, "User logged out");

    (
        jar.remove(removal_cookie(&state.config.auth.cookie_name)),
        Json(MessageResponse {
            message: "Successfully logged out".to_string(),
        }),
    )
}
