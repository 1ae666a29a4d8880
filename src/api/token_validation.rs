//! Access-token check applied to every request.
//!
//! Requests without a token are let through; handlers that need a caller
//! use the [`AuthUser`](super::auth::AuthUser) extractor. A request that
//! does carry a token must carry a good one, so an expired or forged token
//! is answered here with a structured 401 and a login redirect.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::ops::ControlFlow;

use super::error::ApiError;
use super::interceptor::Interceptor;
use crate::auth::{extract_token, TokenCodec, TokenError};
use crate::config::AuthConfig;

pub struct TokenValidation {
    codec: TokenCodec,
    cookie_name: String,
    excluded: Vec<String>,
}

impl TokenValidation {
    pub fn new(codec: TokenCodec, cookie_name: impl Into<String>, excluded: Vec<String>) -> Self {
        Self {
            codec,
            cookie_name: cookie_name.into(),
            excluded,
        }
    }

    pub fn from_config(codec: TokenCodec, config: &AuthConfig) -> Self {
        Self::new(codec, config.cookie_name.clone(), config.excluded_paths.clone())
    }

    /// Exact match, or a sub-path of an excluded entry
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|entry| {
            path == entry
                || path
                    .strip_prefix(entry.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn check(&self, path: &str, headers: &HeaderMap) -> ControlFlow<ApiError> {
        if self.is_excluded(path) {
            return ControlFlow::Continue(());
        }

        let Some(token) = extract_token(headers, &self.cookie_name) else {
            return ControlFlow::Continue(());
        };

        let peeked = match TokenCodec::peek(&token) {
            Ok(claims) => claims,
            Err(_) => {
                tracing::warn!(path = %path, "Rejected undecodable token");
                return ControlFlow::Break(ApiError::invalid_token());
            }
        };

        if peeked.is_expired_at(Utc::now().timestamp()) {
            tracing::info!(path = %path, email = ?peeked.email, "Rejected expired token");
            return ControlFlow::Break(ApiError::token_expired(peeked.exp, peeked.email));
        }

        match self.codec.verify(&token) {
            Ok(_) => ControlFlow::Continue(()),
            Err(TokenError::Expired) => {
                // crossed its expiry between the two decodes
                ControlFlow::Break(ApiError::token_expired(peeked.exp, peeked.email))
            }
            Err(_) => {
                tracing::warn!(path = %path, "Rejected invalid token");
                ControlFlow::Break(ApiError::invalid_token())
            }
        }
    }
}

impl Interceptor for TokenValidation {
    fn name(&self) -> &'static str {
        "token_validation"
    }

    fn intercept(&self, request: &Request<Body>) -> ControlFlow<Response> {
        match self.check(request.uri().path(), request.headers()) {
            ControlFlow::Continue(()) => ControlFlow::Continue(()),
            ControlFlow::Break(err) => ControlFlow::Break(err.into_response()),
        }
    }
}
