//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::Entity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum UserState {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub first_name: String,
    pub display_name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub changed_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub state: UserState,
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "first_name",
        "display_name",
        "email",
        "password_hash",
        "created_at",
        "changed_at",
        "last_login",
        "state",
    ];
}

impl User {
    pub fn is_active(&self) -> bool {
        self.state == UserState::Active
    }
}

/// Row values for a newly registered user
#[derive(Debug, Serialize)]
pub struct NewUser {
    pub name: String,
    pub first_name: String,
    pub display_name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub changed_at: DateTime<Utc>,
    pub state: UserState,
}

/// Partial update of a user row
#[derive(Debug, Default, Serialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<UserState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub first_name: String,
    pub display_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub changed_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub state: UserState,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            first_name: user.first_name,
            display_name: user.display_name,
            email: user.email,
            created_at: user.created_at,
            changed_at: user.changed_at,
            last_login: user.last_login,
            state: user.state,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub first_name: String,
    pub display_name: String,
    pub email: String,
    pub re_email: String,
    pub password: String,
    pub re_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}
