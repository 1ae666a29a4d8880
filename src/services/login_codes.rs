//! Passwordless sign-in with short-lived numeric codes.
//!
//! A code is bound to an email address and is usable once, before its
//! expiry. Requesting a new code for an address discards every code
//! previously issued to it.

use chrono::{Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::validation::is_valid_email;
use crate::db::{DbPool, LoginCode, NewLoginCode, Repository, User};

use super::UserService;

pub const DEFAULT_CODE_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum LoginCodeError {
    #[error("Invalid email address")]
    InvalidEmail,
    /// Wrong, used and expired codes are reported identically
    #[error("Invalid or expired login code")]
    InvalidOrExpiredCode,
    #[error("No user registered for {0}")]
    UserNotFound(String),
    #[error("Account for {0} is inactive")]
    InactiveUser(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Random numeric code of exactly `length` digits
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

#[derive(Clone)]
pub struct LoginCodeService {
    codes: Repository<LoginCode>,
    users: UserService,
    code_length: usize,
}

impl LoginCodeService {
    pub fn new(pool: DbPool, code_length: usize) -> Self {
        Self {
            codes: Repository::new(pool.clone()),
            users: UserService::new(pool),
            code_length,
        }
    }

    /// Issue a fresh code for `email`, valid for `ttl`.
    /// Expired codes of every address are swept first.
    pub async fn request_code(&self, email: &str, ttl: Duration) -> Result<LoginCode, LoginCodeError> {
        if email.is_empty() || !is_valid_email(email) {
            return Err(LoginCodeError::InvalidEmail);
        }

        self.purge_expired(None).await?;

        let discarded = sqlx::query("DELETE FROM login_codes WHERE email = ?")
            .bind(email)
            .execute(self.codes.pool())
            .await?
            .rows_affected();

        let now = Utc::now();
        let code = self
            .codes
            .create(&NewLoginCode {
                email: email.to_string(),
                code: generate_code(self.code_length),
                expires_at: now + ttl,
                created_at: now,
                is_used: false,
            })
            .await?;

        info!(
            email = %code.email,
            discarded,
            expires_at = %code.expires_at,
            "Issued login code"
        );
        Ok(code)
    }

    /// Consume a code and return the account it signs in.
    ///
    /// The code is only consumed once the account is known to exist, and
    /// consumption is a conditional update so two concurrent verifications
    /// of the same code cannot both succeed.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<User, LoginCodeError> {
        if email.is_empty() || code.is_empty() {
            return Err(LoginCodeError::InvalidOrExpiredCode);
        }

        let now = Utc::now();
        let candidates = sqlx::query_as::<_, LoginCode>(
            "SELECT * FROM login_codes WHERE email = ? AND code = ? AND is_used = 0 ORDER BY id DESC",
        )
        .bind(email)
        .bind(code)
        .fetch_all(self.codes.pool())
        .await?;

        let Some(login_code) = candidates.into_iter().find(|c| c.is_valid_at(now)) else {
            warn!(email = %email, "Rejected invalid or expired login code");
            return Err(LoginCodeError::InvalidOrExpiredCode);
        };

        let user = match self.users.find_by_email(email).await? {
            Some(user) if user.is_active() => user,
            Some(user) => {
                warn!(user_id = user.id, email = %email, "Valid login code for inactive user");
                return Err(LoginCodeError::InactiveUser(email.to_string()));
            }
            None => {
                warn!(email = %email, "Valid login code for unknown user");
                return Err(LoginCodeError::UserNotFound(email.to_string()));
            }
        };

        let consumed = sqlx::query("UPDATE login_codes SET is_used = 1 WHERE id = ? AND is_used = 0")
            .bind(login_code.id)
            .execute(self.codes.pool())
            .await?
            .rows_affected();
        if consumed == 0 {
            warn!(email = %email, "Login code was consumed concurrently");
            return Err(LoginCodeError::InvalidOrExpiredCode);
        }

        info!(user_id = user.id, email = %email, "Login code verified");
        Ok(user)
    }

    /// Most recent usable code for `email`
    pub async fn active_code(&self, email: &str) -> Result<Option<LoginCode>, LoginCodeError> {
        let now = Utc::now();
        let codes = sqlx::query_as::<_, LoginCode>(
            "SELECT * FROM login_codes WHERE email = ? AND is_used = 0 ORDER BY id DESC",
        )
        .bind(email)
        .fetch_all(self.codes.pool())
        .await?;

        Ok(codes.into_iter().find(|c| c.is_valid_at(now)))
    }

    /// Delete expired codes, for one address or for all of them
    pub async fn purge_expired(&self, email: Option<&str>) -> Result<u64, LoginCodeError> {
        let now = Utc::now();
        let result = match email {
            Some(email) => {
                sqlx::query(
                    "DELETE FROM login_codes WHERE email = ? AND julianday(expires_at) <= julianday(?)",
                )
                .bind(email)
                .bind(now)
                .execute(self.codes.pool())
                .await?
            }
            None => {
                sqlx::query("DELETE FROM login_codes WHERE julianday(expires_at) <= julianday(?)")
                    .bind(now)
                    .execute(self.codes.pool())
                    .await?
            }
        };

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "Purged expired login codes");
        }
        Ok(purged)
    }

    /// Seconds left on a code, or -1 once it has expired
    pub fn seconds_until_expiry(code: &LoginCode) -> i64 {
        code.seconds_until_expiry_at(Utc::now())
    }
}
