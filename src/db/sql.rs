//! Statements and store logic shared by every relational backend.
//!
//! The SQL uses `$N` placeholders, which Postgres and sqlx's SQLite driver
//! both bind by position. [`account_store!`] expands the one
//! [`AccountStore`](super::AccountStore) implementation for each pool type,
//! so the backends differ only in schema and connection setup.

pub(crate) const FIND_BY_ID: &str = "SELECT * FROM accounts WHERE id = $1";

pub(crate) const FIND_BY_USERNAME: &str =
    "SELECT * FROM accounts WHERE username = $1 AND deleted_at IS NULL";

pub(crate) const INSERT: &str = r#"
INSERT INTO accounts (id, username, password_hash, locked, require_new_password,
                      password_changed_at, last_login_at, created_at, updated_at, deleted_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
RETURNING *
"#;

pub(crate) const SET_PASSWORD: &str = r#"
UPDATE accounts
SET password_hash = $1, require_new_password = FALSE, password_changed_at = $2, updated_at = $2
WHERE id = $3
RETURNING *
"#;

pub(crate) const SET_LOCKED: &str =
    "UPDATE accounts SET locked = $1, updated_at = $2 WHERE id = $3 RETURNING *";

pub(crate) const SET_REQUIRE_NEW_PASSWORD: &str =
    "UPDATE accounts SET require_new_password = $1, updated_at = $2 WHERE id = $3 RETURNING *";

pub(crate) const ARCHIVE: &str = r#"
UPDATE accounts
SET username = $1, password_hash = '', deleted_at = $2, updated_at = $2
WHERE id = $3
RETURNING *
"#;

pub(crate) const SET_LAST_LOGIN: &str =
    "UPDATE accounts SET last_login_at = $1, updated_at = $1 WHERE id = $2 RETURNING *";

/// Implements `AccountStore` for a struct with `pool` and `credentials`
/// fields.
macro_rules! account_store {
    ($store:ty) => {
        impl $store {
            async fn update_flag(
                &self,
                id: ::uuid::Uuid,
                sql: &'static str,
                value: bool,
            ) -> Result<$crate::db::Account, $crate::error::AccountError> {
                ::sqlx::query_as::<_, $crate::db::Account>(sql)
                    .bind(value)
                    .bind(::chrono::Utc::now())
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or($crate::error::AccountError::NotFound)
            }
        }

        #[::async_trait::async_trait]
        impl $crate::db::AccountStore for $store {
            async fn find(
                &self,
                id: ::uuid::Uuid,
            ) -> Result<Option<$crate::db::Account>, $crate::error::StoreError> {
                let account = ::sqlx::query_as::<_, $crate::db::Account>($crate::db::sql::FIND_BY_ID)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
                Ok(account)
            }

            async fn find_by_username(
                &self,
                username: &str,
            ) -> Result<Option<$crate::db::Account>, $crate::error::StoreError> {
                let account =
                    ::sqlx::query_as::<_, $crate::db::Account>($crate::db::sql::FIND_BY_USERNAME)
                        .bind(username)
                        .fetch_optional(&self.pool)
                        .await?;
                Ok(account)
            }

            async fn create(
                &self,
                username: &str,
                password: &str,
            ) -> Result<$crate::db::Account, $crate::error::AccountError> {
                self.credentials
                    .validate_new_account(username, password)
                    .map_err($crate::error::AccountError::Validation)?;

                let hash = self.credentials.hasher.hash_blocking(password).await?;
                let account = $crate::db::Account::new(username.trim().to_string(), hash);

                let mut transaction = self.pool.begin().await?;
                let result = ::sqlx::query_as::<_, $crate::db::Account>($crate::db::sql::INSERT)
                    .bind(account.id)
                    .bind(&account.username)
                    .bind(&account.password_hash)
                    .bind(account.locked)
                    .bind(account.require_new_password)
                    .bind(account.password_changed_at)
                    .bind(account.last_login_at)
                    .bind(account.created_at)
                    .bind(account.updated_at)
                    .bind(account.deleted_at)
                    .fetch_one(&mut *transaction)
                    .await;

                match result {
                    Ok(account) => {
                        transaction.commit().await?;
                        ::tracing::debug!(account_id = %account.id, "Account created");
                        Ok(account)
                    }
                    Err(e) => {
                        transaction.rollback().await?;
                        Err($crate::db::username_taken(e))
                    }
                }
            }

            async fn set_password(
                &self,
                id: ::uuid::Uuid,
                password: &str,
            ) -> Result<$crate::db::Account, $crate::error::AccountError> {
                let account = self
                    .find(id)
                    .await?
                    .ok_or($crate::error::AccountError::NotFound)?;
                self.credentials
                    .validate_password(&account.username, password)
                    .map_err($crate::error::AccountError::Validation)?;

                let hash = self.credentials.hasher.hash_blocking(password).await?;
                ::sqlx::query_as::<_, $crate::db::Account>($crate::db::sql::SET_PASSWORD)
                    .bind(hash)
                    .bind(::chrono::Utc::now())
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or($crate::error::AccountError::NotFound)
            }

            async fn verify_decoy(&self, password: &str) {
                let decoy = self.credentials.hasher.decoy();
                $crate::db::PasswordHasher::verify_blocking(password, &decoy).await;
            }

            async fn lock(
                &self,
                id: ::uuid::Uuid,
            ) -> Result<$crate::db::Account, $crate::error::AccountError> {
                self.update_flag(id, $crate::db::sql::SET_LOCKED, true).await
            }

            async fn unlock(
                &self,
                id: ::uuid::Uuid,
            ) -> Result<$crate::db::Account, $crate::error::AccountError> {
                self.update_flag(id, $crate::db::sql::SET_LOCKED, false).await
            }

            async fn archive(
                &self,
                id: ::uuid::Uuid,
            ) -> Result<$crate::db::Account, $crate::error::AccountError> {
                ::sqlx::query_as::<_, $crate::db::Account>($crate::db::sql::ARCHIVE)
                    .bind($crate::db::models::archived_username(id))
                    .bind(::chrono::Utc::now())
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or($crate::error::AccountError::NotFound)
            }

            async fn require_new_password(
                &self,
                id: ::uuid::Uuid,
            ) -> Result<$crate::db::Account, $crate::error::AccountError> {
                self.update_flag(id, $crate::db::sql::SET_REQUIRE_NEW_PASSWORD, true)
                    .await
            }

            async fn set_last_login(
                &self,
                id: ::uuid::Uuid,
            ) -> Result<$crate::db::Account, $crate::error::AccountError> {
                ::sqlx::query_as::<_, $crate::db::Account>($crate::db::sql::SET_LAST_LOGIN)
                    .bind(::chrono::Utc::now())
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or($crate::error::AccountError::NotFound)
            }
        }
    };
}

pub(crate) use account_store;
