//! One-time login codes for passwordless sign-in.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::db::Entity;

#[derive(Debug, Clone, FromRow)]
pub struct LoginCode {
    pub id: i64,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_used: bool,
}

impl Entity for LoginCode {
    const TABLE: &'static str = "login_codes";
    const COLUMNS: &'static [&'static str] =
        &["email", "code", "expires_at", "created_at", "is_used"];
}

impl LoginCode {
    /// A code stops being usable the instant `now` reaches its expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && !self.is_expired_at(now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Whole seconds until expiry, or -1 once expired
    pub fn seconds_until_expiry_at(&self, now: DateTime<Utc>) -> i64 {
        if self.is_expired_at(now) {
            -1
        } else {
            (self.expires_at - now).num_seconds()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NewLoginCode {
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_used: bool,
}
