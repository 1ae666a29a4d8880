//! HS256 access tokens.
//!
//! Tokens carry the holder's id, email, rights and groups. Verification is
//! strict about expiry: a token is expired once `now > exp`, and a token
//! whose `exp` is not after its `iat` is never accepted.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;

pub const DEFAULT_RIGHTS: &[&str] = &["READ"];
pub const DEFAULT_GROUPS: &[&str] = &["ACTIVE_USER"];

/// Rights granted to interactive logins
pub const LOGIN_RIGHTS: &[&str] = &["READ", "EDIT"];

fn default_rights() -> Vec<String> {
    to_strings(DEFAULT_RIGHTS)
}

fn default_groups() -> Vec<String> {
    to_strings(DEFAULT_GROUPS)
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Claims included in issued access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub email: String,
    #[serde(default = "default_rights")]
    pub rights: Vec<String>,
    #[serde(default = "default_groups")]
    pub groups: Vec<String>,
    /// Issued-at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

/// Who a token is issued to, before timestamps are stamped
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: i64,
    pub email: String,
    pub rights: Vec<String>,
    pub groups: Vec<String>,
}

impl TokenSubject {
    pub fn new(user_id: i64, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            rights: default_rights(),
            groups: default_groups(),
        }
    }

    pub fn with_rights(mut self, rights: &[&str]) -> Self {
        self.rights = to_strings(rights);
        self
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = to_strings(groups);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Claims read without checking the signature. Only `exp`, `iat` and
/// `email` are looked at, so a forged token can do no more than pick
/// which 401 it gets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnverifiedClaims {
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub email: Option<String>,
}

impl UnverifiedClaims {
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.exp {
            Some(exp) => is_expired(exp, self.iat, now),
            None => false,
        }
    }
}

fn is_expired(exp: i64, iat: Option<i64>, now: i64) -> bool {
    now > exp || iat.is_some_and(|iat| exp <= iat)
}

/// Signs and verifies access tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    default_ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, default_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            default_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.secret_key,
            Duration::minutes(config.access_token_ttl_minutes),
        )
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token valid for `ttl` from now
    pub fn issue(&self, subject: &TokenSubject, ttl: Duration) -> Result<String, TokenError> {
        self.issue_at(subject, Utc::now(), ttl)
    }

    pub fn issue_at(
        &self,
        subject: &TokenSubject,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let claims = Claims {
            user_id: subject.user_id,
            email: subject.email.clone(),
            rights: subject.rights.clone(),
            groups: subject.groups.clone(),
            iat,
            exp: iat + ttl.num_seconds(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry and return the claims.
    ///
    /// Fails closed: anything other than a well-formed, correctly signed,
    /// unexpired token with `user_id` and `email` is rejected.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        if is_expired(claims.exp, Some(claims.iat), Utc::now().timestamp()) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Decode the payload without checking the signature
    pub fn peek(token: &str) -> Result<UnverifiedClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<UnverifiedClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test_secret_key_for_testing_purposes_only", Duration::minutes(30))
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let codec = codec();
        let subject = TokenSubject::new(7, "user@example.com").with_rights(LOGIN_RIGHTS);
        let now = Utc::now();

        let token = codec.issue_at(&subject, now, Duration::minutes(30)).unwrap();
        let claims = codec.verify(&token).unwrap();

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.rights, vec!["READ", "EDIT"]);
        assert_eq!(claims.groups, vec!["ACTIVE_USER"]);
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp, claims.iat + 30 * 60);
    }

    #[test]
    fn test_default_rights_and_groups() {
        let subject = TokenSubject::new(1, "a@example.com");
        assert_eq!(subject.rights, vec!["READ"]);
        assert_eq!(subject.groups, vec!["ACTIVE_USER"]);
    }

    #[test]
    fn test_negative_ttl_is_expired() {
        let codec = codec();
        let token = codec
            .issue(&TokenSubject::new(1, "a@example.com"), Duration::minutes(-1))
            .unwrap();
        assert_eq!(codec.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let codec = codec();
        let token = codec
            .issue(&TokenSubject::new(1, "a@example.com"), Duration::zero())
            .unwrap();
        assert_eq!(codec.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_token_issued_in_the_past_expires() {
        let codec = codec();
        let issued = Utc::now() - Duration::minutes(31);
        let token = codec
            .issue_at(&TokenSubject::new(1, "a@example.com"), issued, Duration::minutes(30))
            .unwrap();
        assert_eq!(codec.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_bad_signature() {
        let token = TokenCodec::new("secret-A", Duration::minutes(30))
            .issue(&TokenSubject::new(1, "a@example.com"), Duration::minutes(30))
            .unwrap();
        let other = TokenCodec::new("secret-B", Duration::minutes(30));
        assert_eq!(other.verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_garbage_and_empty_tokens() {
        let codec = codec();
        assert_eq!(codec.verify("not.a.token"), Err(TokenError::Invalid));
        assert_eq!(codec.verify("garbage"), Err(TokenError::Invalid));
        assert_eq!(codec.verify(""), Err(TokenError::Invalid));
    }

    #[test]
    fn test_missing_user_id_is_invalid() {
        let now = Utc::now().timestamp();
        let payload = serde_json::json!({
            "email": "a@example.com",
            "iat": now,
            "exp": now + 600,
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(b"test_secret_key_for_testing_purposes_only"),
        )
        .unwrap();

        assert_eq!(codec().verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_missing_email_is_invalid() {
        let now = Utc::now().timestamp();
        let payload = serde_json::json!({ "user_id": 3, "iat": now, "exp": now + 600 });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(b"test_secret_key_for_testing_purposes_only"),
        )
        .unwrap();

        assert_eq!(codec().verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_peek_reads_claims_without_key() {
        let token = TokenCodec::new("some-other-secret", Duration::minutes(30))
            .issue(&TokenSubject::new(9, "peek@example.com"), Duration::minutes(-5))
            .unwrap();

        let peeked = TokenCodec::peek(&token).unwrap();
        assert_eq!(peeked.email.as_deref(), Some("peek@example.com"));
        assert!(peeked.is_expired_at(Utc::now().timestamp()));
    }

    #[test]
    fn test_peek_rejects_garbage() {
        assert_eq!(TokenCodec::peek("garbage").unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_expiry_is_strict_greater_than() {
        let claims = UnverifiedClaims {
            exp: Some(100),
            iat: Some(50),
            email: None,
        };
        assert!(!claims.is_expired_at(100));
        assert!(claims.is_expired_at(101));
    }
}
