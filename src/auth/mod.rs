//! Token issuance, password hashing and token transport.

pub mod jwt;
pub mod password;

pub use jwt::{Claims, TokenCodec, TokenError, TokenSubject};
pub use password::{hash_password, verify_password};

use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;

/// Find the access token on a request.
///
/// The `Authorization: Bearer` header wins over the cookie. The cookie value
/// may be quoted and may carry its own `bearer ` prefix.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(auth_header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    let jar = CookieJar::from_headers(headers);
    let value = jar.get(cookie_name)?.value().trim_matches('"');
    if value.is_empty() {
        return None;
    }

    let token = value
        .strip_prefix("bearer ")
        .or_else(|| value.strip_prefix("Bearer "))
        .unwrap_or(value);
    Some(token.to_string())
}

/// HttpOnly cookie carrying a freshly issued token
pub fn access_cookie(name: &str, token: &str, ttl: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), token.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

/// Cookie that clears the access token
pub fn removal_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), String::new()))
        .path("/")
        .build()
}
