//! Unified API error handling.
//!
//! Every failed request is answered with the same flat JSON body:
//! `{"detail": ..., "error_code": ...}` plus optional context fields.
//! Authentication failures add `redirect_to` so clients know where to send
//! the user.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::auth::TokenError;
use crate::services::{LoginCodeError, UserError};

/// Where clients should send a user whose token was rejected
pub const LOGIN_REDIRECT: &str = "/login";

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Client errors (4xx)
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ValidationError,
    TokenExpired,
    InvalidToken,
    InvalidEmail,
    InvalidOrExpiredCode,
    UserNotFound,

    // Server errors (5xx)
    InternalError,
    DatabaseError,
}

impl ErrorCode {
    /// Get the default HTTP status code for this error code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::TokenExpired => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidEmail => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidOrExpiredCode => StatusCode::UNAUTHORIZED,
            ErrorCode::UserNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::InvalidEmail => "INVALID_EMAIL",
            ErrorCode::InvalidOrExpiredCode => "INVALID_OR_EXPIRED_CODE",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
        }
    }
}

/// The JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub detail: String,
    /// Machine-readable error code
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    /// Expiry of a rejected token (seconds since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    /// Field-level validation errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, Vec<String>>>,
}

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    redirect_to: Option<String>,
    expired_at: Option<i64>,
    user_email: Option<String>,
    errors: Option<HashMap<String, Vec<String>>>,
    /// Send `WWW-Authenticate: Bearer` with the response
    bearer_challenge: bool,
}

impl ApiError {
    /// Create a new API error with a specific code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            redirect_to: None,
            expired_at: None,
            user_email: None,
            errors: None,
            bearer_challenge: false,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn with_redirect(mut self, to: impl Into<String>) -> Self {
        self.redirect_to = Some(to.into());
        self
    }

    pub fn with_bearer_challenge(mut self) -> Self {
        self.bearer_challenge = true;
        self
    }

    /// Add validation errors as details
    pub fn with_validation_errors(mut self, errors: HashMap<String, Vec<String>>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Bad request error (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Unauthorized error (401) - authentication required
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Forbidden error (403) - authenticated but not allowed
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Not found error (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Conflict error (409) - resource already exists
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Validation error (400) with field-level details
    pub fn validation(errors: HashMap<String, Vec<String>>) -> Self {
        let message = if errors.len() == 1 {
            errors
                .values()
                .next()
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string())
        } else {
            format!("Validation failed for {} fields", errors.len())
        };

        Self::new(ErrorCode::ValidationError, message).with_validation_errors(errors)
    }

    /// Single field validation error
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }

    /// Expired access token (401)
    pub fn token_expired(expired_at: Option<i64>, user_email: Option<String>) -> Self {
        let mut err = Self::new(ErrorCode::TokenExpired, "Token expired").with_redirect(LOGIN_REDIRECT);
        err.expired_at = expired_at;
        err.user_email = user_email;
        err
    }

    /// Tampered or malformed access token (401)
    pub fn invalid_token() -> Self {
        Self::new(ErrorCode::InvalidToken, "Invalid token").with_redirect(LOGIN_REDIRECT)
    }

    pub fn invalid_email() -> Self {
        Self::new(ErrorCode::InvalidEmail, "Invalid email address")
    }

    /// Wrong and expired codes look the same to the caller
    pub fn invalid_or_expired_code() -> Self {
        Self::new(ErrorCode::InvalidOrExpiredCode, "Invalid or expired login code")
    }

    pub fn user_not_found() -> Self {
        Self::new(ErrorCode::UserNotFound, "User not found")
    }

    /// Same status as an unknown user, told apart only by the message
    pub fn user_inactive() -> Self {
        Self::new(ErrorCode::UserNotFound, "User account is inactive")
    }

    /// Internal server error (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error (500)
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    fn into_body(self) -> ErrorResponse {
        ErrorResponse {
            detail: self.message,
            error_code: self.code.as_str().to_string(),
            redirect_to: self.redirect_to,
            expired_at: self.expired_at,
            user_email: self.user_email,
            errors: self.errors,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        let challenge = self.bearer_challenge;

        let mut response = (status, Json(self.into_body())).into_response();
        if challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);

        match &err {
            sqlx::Error::RowNotFound => ApiError::not_found("Resource not found"),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    ApiError::conflict("A resource with this identifier already exists")
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    ApiError::bad_request("Referenced resource does not exist")
                } else {
                    ApiError::database("A database error occurred")
                }
            }
            _ => ApiError::database("A database error occurred"),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::token_expired(None, None),
            TokenError::Invalid => ApiError::invalid_token(),
            TokenError::Signing(msg) => {
                tracing::error!("Token signing failed: {}", msg);
                ApiError::internal("Failed to issue access token")
            }
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::EmailTaken(_) | UserError::DisplayNameTaken(_) => {
                ApiError::bad_request(err.to_string())
            }
            UserError::Hashing(msg) => {
                tracing::error!("Password hashing failed: {}", msg);
                ApiError::internal("Failed to process password")
            }
            UserError::Database(e) => e.into(),
        }
    }
}

impl From<LoginCodeError> for ApiError {
    fn from(err: LoginCodeError) -> Self {
        match err {
            LoginCodeError::InvalidEmail => ApiError::invalid_email(),
            LoginCodeError::InvalidOrExpiredCode => ApiError::invalid_or_expired_code(),
            LoginCodeError::UserNotFound(_) => ApiError::user_not_found(),
            LoginCodeError::InactiveUser(_) => ApiError::user_inactive(),
            LoginCodeError::Database(e) => e.into(),
        }
    }
}

/// Builder for collecting multiple validation errors
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: HashMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation error for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record the error of a `validate_*` check, if any
    pub fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.add(field, message);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Build the ApiError if there are any errors
    pub fn build(self) -> Option<ApiError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(ApiError::validation(self.errors))
        }
    }

    /// Return Ok(()) if no errors, or Err(ApiError) if there are errors
    pub fn finish(self) -> Result<(), ApiError> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(ErrorCode::InvalidEmail.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidOrExpiredCode.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::UserNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_code_serializes_like_as_str() {
        for code in [ErrorCode::TokenExpired, ErrorCode::InvalidOrExpiredCode, ErrorCode::BadRequest] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, serde_json::Value::String(code.as_str().to_string()));
        }
    }

    #[tokio::test]
    async fn test_token_expired_body() {
        let response =
            ApiError::token_expired(Some(1_700_000_000), Some("a@example.com".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["detail"], "Token expired");
        assert_eq!(body["error_code"], "TOKEN_EXPIRED");
        assert_eq!(body["redirect_to"], "/login");
        assert_eq!(body["expired_at"], 1_700_000_000);
        assert_eq!(body["user_email"], "a@example.com");
    }

    #[tokio::test]
    async fn test_invalid_token_body_has_no_context_fields() {
        let body = body_json(ApiError::invalid_token().into_response()).await;
        assert_eq!(body["error_code"], "INVALID_TOKEN");
        assert_eq!(body["redirect_to"], "/login");
        assert!(body.get("expired_at").is_none());
        assert!(body.get("user_email").is_none());
    }

    #[test]
    fn test_bearer_challenge_header() {
        let response = ApiError::unauthorized("Not authenticated")
            .with_bearer_challenge()
            .into_response();
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");

        let plain = ApiError::unauthorized("Not authenticated").into_response();
        assert!(plain.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_validation_error_single_field() {
        let err = ApiError::validation_field("title", "Title is required");
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.message, "Title is required");
    }

    #[test]
    fn test_validation_error_builder() {
        let mut builder = ValidationErrorBuilder::new();
        builder.add("name", "Name is required");
        builder.check("email", Err("Invalid email format".to_string()));
        builder.check("author", Ok(()));
        builder.add("name", "Name is too short");

        let err = builder.build().unwrap();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(err.message.contains("2 fields"));

        let errors = err.errors.unwrap();
        assert_eq!(errors.get("name").unwrap().len(), 2);
        assert_eq!(errors.get("email").unwrap().len(), 1);
        assert!(errors.get("author").is_none());
    }

    #[test]
    fn test_domain_error_mapping() {
        assert_eq!(
            ApiError::from(LoginCodeError::InvalidEmail).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(LoginCodeError::InvalidOrExpiredCode).code(),
            ErrorCode::InvalidOrExpiredCode
        );
        assert_eq!(
            ApiError::from(LoginCodeError::UserNotFound("x@example.com".into())).status(),
            StatusCode::NOT_FOUND
        );
        let inactive = ApiError::from(LoginCodeError::InactiveUser("x@example.com".into()));
        assert_eq!(inactive.status(), StatusCode::NOT_FOUND);
        assert_eq!(inactive.code(), ErrorCode::UserNotFound);
        assert!(inactive.message().contains("inactive"));
        assert_eq!(ApiError::from(TokenError::Expired).code(), ErrorCode::TokenExpired);
        assert_eq!(
            ApiError::from(UserError::EmailTaken("x@example.com".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
