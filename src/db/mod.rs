//! Account persistence.
//!
//! [`AccountStore`] is the only interface the rest of the service sees.
//! Two relational backends implement it with identical behaviour:
//! [`PgAccountStore`] for production and [`SqliteAccountStore`], which the
//! test harness runs against an in-memory database.

pub mod models;
pub mod password;
pub mod postgres;
pub mod sqlite;
mod sql;

use async_trait::async_trait;
use uuid::Uuid;

use crate::envelope::{FieldError, FieldErrors, FORMAT_INVALID, INSECURE, MISSING, TAKEN};
use crate::error::{AccountError, StoreError};

pub use models::Account;
pub use password::{HashCost, PasswordHasher};
pub use postgres::PgAccountStore;
pub use sqlite::SqliteAccountStore;

const MAX_USERNAME_LENGTH: usize = 255;

/// Hashing and password rules shared by every backend.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub hasher: PasswordHasher,
    pub min_password_length: usize,
}

impl Credentials {
    pub fn new(hasher: PasswordHasher, min_password_length: usize) -> Self {
        Self {
            hasher,
            min_password_length,
        }
    }

    /// Checks a registration, collecting every problem in field order.
    pub fn validate_new_account(&self, username: &str, password: &str) -> Result<(), FieldErrors> {
        let mut errors = Vec::new();
        let trimmed = username.trim();
        if trimmed.is_empty() {
            errors.push(FieldError::new("username", MISSING));
        } else if trimmed.len() > MAX_USERNAME_LENGTH || trimmed.chars().any(char::is_whitespace) {
            errors.push(FieldError::new("username", FORMAT_INVALID));
        }
        if let Some(error) = self.password_problem(username, password) {
            errors.push(error);
        }
        FieldErrors::from_vec(errors).map_or(Ok(()), Err)
    }

    pub fn validate_password(&self, username: &str, password: &str) -> Result<(), FieldErrors> {
        self.password_problem(username, password)
            .map_or(Ok(()), |e| Err(FieldErrors::new(e)))
    }

    fn password_problem(&self, username: &str, password: &str) -> Option<FieldError> {
        if password.is_empty() {
            Some(FieldError::new("password", MISSING))
        } else if password.chars().count() < self.min_password_length
            || password.eq_ignore_ascii_case(username.trim())
        {
            Some(FieldError::new("password", INSECURE))
        } else {
            None
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Archived accounts are never returned.
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    async fn create(&self, username: &str, password: &str) -> Result<Account, AccountError>;

    async fn set_password(&self, id: Uuid, password: &str) -> Result<Account, AccountError>;

    async fn lock(&self, id: Uuid) -> Result<Account, AccountError>;

    async fn unlock(&self, id: Uuid) -> Result<Account, AccountError>;

    /// Soft-disables the account: the row stays, the username is released and
    /// the password hash is cleared.
    async fn archive(&self, id: Uuid) -> Result<Account, AccountError>;

    async fn require_new_password(&self, id: Uuid) -> Result<Account, AccountError>;

    async fn set_last_login(&self, id: Uuid) -> Result<Account, AccountError>;

    /// Argon2 verification with the cost recorded in the stored hash.
    async fn verify_password(&self, account: &Account, password: &str) -> bool {
        PasswordHasher::verify_blocking(password, &account.password_hash).await
    }

    /// One verification that always fails, so an unknown username takes as
    /// long as a wrong password.
    async fn verify_decoy(&self, password: &str) {
        PasswordHasher::verify_blocking(password, &PasswordHasher::default().decoy()).await;
    }
}

/// Maps a unique-constraint violation on insert to `username: TAKEN`.
pub(crate) fn username_taken(err: sqlx::Error) -> AccountError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AccountError::Validation(
            FieldErrors::new(FieldError::new("username", TAKEN)),
        ),
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        let hasher = PasswordHasher::new(HashCost {
            memory_kib: 64,
            iterations: 1,
        })
        .unwrap();
        Credentials::new(hasher, 8)
    }

    #[test]
    fn test_valid_registration() {
        assert!(credentials().validate_new_account("alice", "correct-horse").is_ok());
    }

    #[test]
    fn test_errors_in_field_order() {
        let errors = credentials().validate_new_account("", "").unwrap_err().into_vec();
        assert_eq!(
            errors,
            vec![
                FieldError::new("username", MISSING),
                FieldError::new("password", MISSING),
            ]
        );
    }

    #[test]
    fn test_malformed_username() {
        let errors = credentials().validate_new_account("two words", "correct-horse").unwrap_err();
        assert_eq!(errors.into_vec(), vec![FieldError::new("username", FORMAT_INVALID)]);
    }

    #[test]
    fn test_weak_passwords() {
        let creds = credentials();
        let short = creds.validate_new_account("alice", "short").unwrap_err();
        assert_eq!(short.into_vec(), vec![FieldError::new("password", INSECURE)]);

        let same = creds.validate_password("longusername", "LongUsername").unwrap_err();
        assert_eq!(same.into_vec(), vec![FieldError::new("password", INSECURE)]);
    }
}
