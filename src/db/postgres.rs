use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use super::sql::account_store;
use super::Credentials;
use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id UUID PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    locked BOOLEAN NOT NULL DEFAULT FALSE,
    require_new_password BOOLEAN NOT NULL DEFAULT FALSE,
    password_changed_at TIMESTAMPTZ NOT NULL,
    last_login_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ
)
"#;

/// Postgres-backed [`AccountStore`](super::AccountStore). Every mutation is
/// a single statement, so each one is atomic and visible to the next read.
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
    credentials: Credentials,
}

impl PgAccountStore {
    pub fn new(pool: PgPool, credentials: Credentials) -> Self {
        Self { pool, credentials }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        credentials: Credentials,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        info!(max_connections, "Connected to Postgres account store");
        Ok(Self::new(pool, credentials))
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

account_store!(PgAccountStore);
