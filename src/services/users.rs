//! User registration, authentication and account changes.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password};
use crate::db::{DbPool, NewUser, RegisterRequest, Repository, User, UserPatch, UserState};

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Email {0} is already registered")]
    EmailTaken(String),
    #[error("Display name {0} is already taken")]
    DisplayNameTaken(String),
    #[error("Failed to hash password: {0}")]
    Hashing(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct UserService {
    repo: Repository<User>,
}

impl UserService {
    pub fn new(pool: DbPool) -> Self {
        Self {
            repo: Repository::new(pool),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        self.repo.read(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.repo.pool())
            .await
    }

    pub async fn find_by_display_name(&self, display_name: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE display_name = ?")
            .bind(display_name)
            .fetch_optional(self.repo.pool())
            .await
    }

    /// Create an active account. The request is assumed to be validated.
    pub async fn register(&self, req: &RegisterRequest) -> Result<User, UserError> {
        if self.find_by_email(&req.email).await?.is_some() {
            return Err(UserError::EmailTaken(req.email.clone()));
        }
        if self.find_by_display_name(&req.display_name).await?.is_some() {
            return Err(UserError::DisplayNameTaken(req.display_name.clone()));
        }

        let password_hash =
            hash_password(&req.password).map_err(|e| UserError::Hashing(e.to_string()))?;
        let now = Utc::now();
        let new_user = NewUser {
            name: req.name.clone(),
            first_name: req.first_name.clone(),
            display_name: req.display_name.clone(),
            email: req.email.clone(),
            password_hash,
            created_at: now,
            changed_at: now,
            state: UserState::Active,
        };

        let user = self.insert(&new_user).await?;
        info!(user_id = user.id, email = %user.email, "User registered");
        Ok(user)
    }

    /// Insert a user row, mapping unique violations from a concurrent
    /// registration onto the column that collided
    async fn insert(&self, new_user: &NewUser) -> Result<User, UserError> {
        match self.repo.create(new_user).await {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db_err))
                if db_err.message().contains("UNIQUE constraint failed") =>
            {
                if db_err.message().contains("users.display_name") {
                    Err(UserError::DisplayNameTaken(new_user.display_name.clone()))
                } else {
                    Err(UserError::EmailTaken(new_user.email.clone()))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check credentials of an active user and record the login time
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, UserError> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };
        if !user.is_active() {
            warn!(user_id = user.id, "Login attempt for inactive user");
            return Ok(None);
        }
        if !verify_password(password, &user.password_hash) {
            return Ok(None);
        }

        let patch = UserPatch {
            last_login: Some(Utc::now()),
            ..Default::default()
        };
        Ok(self.repo.update(user.id, &patch).await?)
    }

    pub async fn reset_password(&self, id: i64, new_password: &str) -> Result<Option<User>, UserError> {
        let password_hash =
            hash_password(new_password).map_err(|e| UserError::Hashing(e.to_string()))?;
        let patch = UserPatch {
            password_hash: Some(password_hash),
            changed_at: Some(Utc::now()),
            ..Default::default()
        };

        let user = self.repo.update(id, &patch).await?;
        if user.is_some() {
            info!(user_id = id, "Password reset");
        }
        Ok(user)
    }

    pub async fn deactivate(&self, id: i64) -> Result<Option<User>, UserError> {
        let patch = UserPatch {
            state: Some(UserState::Inactive),
            changed_at: Some(Utc::now()),
            ..Default::default()
        };

        let user = self.repo.update(id, &patch).await?;
        if user.is_some() {
            info!(user_id = id, "User deactivated");
        }
        Ok(user)
    }
}

/// Registration payload for tests and fixtures
#[cfg(test)]
pub fn test_registration(email: &str, display_name: &str) -> RegisterRequest {
    RegisterRequest {
        name: "Lovelace".to_string(),
        first_name: "Ada".to_string(),
        display_name: display_name.to_string(),
        email: email.to_string(),
        re_email: email.to_string(),
        password: "Secur3-Pass".to_string(),
        re_password: "Secur3-Pass".to_string(),
    }
}
