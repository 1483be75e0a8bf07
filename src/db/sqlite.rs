use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use super::sql::account_store;
use super::Credentials;
use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id BLOB PRIMARY KEY NOT NULL,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    locked BOOLEAN NOT NULL DEFAULT FALSE,
    require_new_password BOOLEAN NOT NULL DEFAULT FALSE,
    password_changed_at TEXT NOT NULL,
    last_login_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
)
"#;

/// SQLite-backed [`AccountStore`](super::AccountStore). Shares every
/// statement with the Postgres store.
#[derive(Debug, Clone)]
pub struct SqliteAccountStore {
    pool: SqlitePool,
    credentials: Credentials,
}

impl SqliteAccountStore {
    pub fn new(pool: SqlitePool, credentials: Credentials) -> Self {
        Self { pool, credentials }
    }

    pub async fn connect(url: &str, credentials: Credentials) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self::new(pool, credentials))
    }

    /// A private database that lives as long as the returned store.
    pub async fn in_memory(credentials: Credentials) -> Result<Self, StoreError> {
        // Every connection to `:memory:` opens a fresh database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool, credentials);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

account_store!(SqliteAccountStore);
