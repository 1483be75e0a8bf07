use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{Account, AccountStore};
use crate::envelope::{FieldError, FieldErrors, EXPIRED, FAILED, LOCKED};
use crate::error::AppError;
use crate::tokens::{RefreshToken, RefreshTokenStore};

/// Session workflows on top of the account and refresh token stores.
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
}

fn rejected(field: &str, message: &str) -> AppError {
    AppError::Validation(FieldErrors::new(FieldError::new(field, message)))
}

impl AuthService {
    pub fn new(accounts: Arc<dyn AccountStore>, refresh_tokens: Arc<dyn RefreshTokenStore>) -> Self {
        Self {
            accounts,
            refresh_tokens,
        }
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    pub fn refresh_tokens(&self) -> &Arc<dyn RefreshTokenStore> {
        &self.refresh_tokens
    }

    /// Creates the account and opens its first session.
    pub async fn register(&self, username: &str, password: &str) -> Result<(Account, RefreshToken), AppError> {
        let account = self.accounts.create(username, password).await?;
        let token = self.refresh_tokens.create(account.id).await?;
        info!(account_id = %account.id, "Account registered");
        Ok((account, token))
    }

    /// Bad usernames and bad passwords fail identically.
    pub async fn login(&self, username: &str, password: &str) -> Result<(Account, RefreshToken), AppError> {
        let Some(account) = self.accounts.find_by_username(username).await? else {
            self.accounts.verify_decoy(password).await;
            return Err(rejected("credentials", FAILED));
        };

        if !self.accounts.verify_password(&account, password).await {
            warn!(account_id = %account.id, "Password verification failed");
            return Err(rejected("credentials", FAILED));
        }
        if account.locked {
            return Err(rejected("account", LOCKED));
        }
        if account.require_new_password {
            return Err(rejected("credentials", EXPIRED));
        }

        let account = self.accounts.set_last_login(account.id).await?;
        let token = self.refresh_tokens.create(account.id).await?;
        info!(account_id = %account.id, "Session started");
        Ok((account, token))
    }

    /// Resolves a refresh token to an account that may still hold a session.
    pub async fn refresh(&self, token: &str) -> Result<Account, AppError> {
        let account_id = self
            .refresh_tokens
            .find(token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid session".into()))?;

        let account = self
            .accounts
            .find(account_id)
            .await?
            .filter(Account::is_active)
            .ok_or_else(|| AppError::Unauthorized("Invalid session".into()))?;

        self.refresh_tokens.touch(token).await?;
        Ok(account)
    }

    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        self.refresh_tokens.revoke(token).await?;
        Ok(())
    }

    /// Changes the password, ends every other session and opens a new one.
    pub async fn change_password(&self, token: &str, password: &str) -> Result<RefreshToken, AppError> {
        let account = self.refresh(token).await?;
        let account = self.accounts.set_password(account.id, password).await?;

        self.refresh_tokens.revoke_all(account.id).await?;
        let token = self.refresh_tokens.create(account.id).await?;
        info!(account_id = %account.id, "Password changed");
        Ok(token)
    }

    pub async fn active_sessions(&self, account_id: Uuid) -> Result<usize, AppError> {
        Ok(self.refresh_tokens.active_sessions(account_id).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Credentials, HashCost, MockAccountStore, PasswordHasher, SqliteAccountStore};
    use crate::tokens::MemoryRefreshTokenStore;
    use std::time::Duration;

    async fn service() -> AuthService {
        let hasher = PasswordHasher::new(HashCost {
            memory_kib: 64,
            iterations: 1,
        })
        .unwrap();
        let accounts = SqliteAccountStore::in_memory(Credentials::new(hasher, 8))
            .await
            .unwrap();
        AuthService::new(
            Arc::new(accounts),
            Arc::new(MemoryRefreshTokenStore::new(Duration::from_secs(60))),
        )
    }

    fn field_errors(err: AppError) -> Vec<FieldError> {
        match err {
            AppError::Validation(errors) => errors.into_vec(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let service = service().await;
        let (account, first) = service.register("alice", "correct-horse").await.unwrap();
        let (same, second) = service.login("alice", "correct-horse").await.unwrap();

        assert_eq!(account.id, same.id);
        assert!(same.last_login_at.is_some());
        assert_ne!(first.token, second.token);
        assert_eq!(service.active_sessions(account.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let service = service().await;
        service.register("alice", "correct-horse").await.unwrap();

        let unknown = field_errors(service.login("nobody", "correct-horse").await.unwrap_err());
        let wrong = field_errors(service.login("alice", "wrong-password").await.unwrap_err());
        assert_eq!(unknown, wrong);
        assert_eq!(wrong, vec![FieldError::new("credentials", FAILED)]);
    }

    #[tokio::test]
    async fn test_unknown_username_still_verifies_a_password() {
        let mut accounts = MockAccountStore::new();
        accounts
            .expect_find_by_username()
            .returning(|_| Ok(None));
        accounts
            .expect_verify_decoy()
            .withf(|password| password.to_string() == "correct-horse")
            .times(1)
            .returning(|_| ());
        let service = AuthService::new(
            Arc::new(accounts),
            Arc::new(MemoryRefreshTokenStore::new(Duration::from_secs(60))),
        );

        let errors = field_errors(service.login("nobody", "correct-horse").await.unwrap_err());
        assert_eq!(errors, vec![FieldError::new("credentials", FAILED)]);
    }

    #[tokio::test]
    async fn test_locked_account_cannot_login_or_refresh() {
        let service = service().await;
        let (account, token) = service.register("alice", "correct-horse").await.unwrap();
        service.accounts().lock(account.id).await.unwrap();

        let errors = field_errors(service.login("alice", "correct-horse").await.unwrap_err());
        assert_eq!(errors, vec![FieldError::new("account", LOCKED)]);
        assert!(matches!(
            service.refresh(&token.token).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_required_password_change_blocks_login() {
        let service = service().await;
        let (account, _) = service.register("alice", "correct-horse").await.unwrap();
        service.accounts().require_new_password(account.id).await.unwrap();

        let errors = field_errors(service.login("alice", "correct-horse").await.unwrap_err());
        assert_eq!(errors, vec![FieldError::new("credentials", EXPIRED)]);
    }

    #[tokio::test]
    async fn test_change_password_rotates_sessions() {
        let service = service().await;
        let (account, old) = service.register("alice", "correct-horse").await.unwrap();

        let new = service.change_password(&old.token, "battery-staple").await.unwrap();

        assert!(matches!(service.refresh(&old.token).await, Err(AppError::Unauthorized(_))));
        assert_eq!(service.refresh(&new.token).await.unwrap().id, account.id);
        assert!(service.login("alice", "battery-staple").await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_revokes() {
        let service = service().await;
        let (_, token) = service.register("alice", "correct-horse").await.unwrap();
        service.logout(&token.token).await.unwrap();
        service.logout(&token.token).await.unwrap();
        assert!(service.refresh(&token.token).await.is_err());
    }
}
