//! Passwordless sign-in endpoints.

use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::start_session;
use super::error::ApiError;
use crate::db::LoginResponse;
use crate::services::LoginCodeService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PasswordlessLoginRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordlessLoginResponse {
    pub message: String,
    pub expires_in_minutes: i64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyLoginCodeRequest {
    pub email: String,
    pub code: String,
}

fn service(state: &AppState) -> LoginCodeService {
    LoginCodeService::new(state.db.clone(), state.config.login_code.length)
}

/// Email a one-time login code
pub async fn passwordless_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordlessLoginRequest>,
) -> Result<Json<PasswordlessLoginResponse>, ApiError> {
    let expiry_minutes = state.config.login_code.expiry_minutes;
    let code = service(&state)
        .request_code(&req.email, Duration::minutes(expiry_minutes))
        .await?;

    if !state
        .mail
        .send_login_code(&code.email, &code.code, expiry_minutes)
        .await
    {
        tracing::warn!(email = %code.email, "Login code created but not delivered");
    }

    Ok(Json(PasswordlessLoginResponse {
        message: format!("Login code sent to {}", code.email),
        expires_in_minutes: expiry_minutes,
    }))
}

/// Exchange a login code for an access token
pub async fn verify_login_code(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<VerifyLoginCodeRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let user = service(&state).verify_code(&req.email, &req.code).await?;
    start_session(&state, jar, user)
}
