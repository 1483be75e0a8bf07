//! Refresh token lifecycle.
//!
//! Tokens are opaque: 32 random bytes, base64url encoded, handed to the
//! client once. Backends only ever see the SHA-256 digest of a token, and
//! enforce expiry themselves. A token that is gone is simply `None`,
//! whether it expired, was revoked or never existed.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::TokenStoreError;

pub use self::memory::MemoryRefreshTokenStore;
pub use self::redis::RedisRefreshTokenStore;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshToken {
    pub token: String,
    pub account_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    fn issue(account_id: Uuid, token: String, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|lifetime| created_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            token,
            account_id,
            created_at,
            expires_at,
        }
    }
}

/// Fresh high-entropy token value from the thread-local CSPRNG.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Storage key for a token; the raw value is never persisted.
pub fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Lifetime given to tokens by [`RefreshTokenStore::create`].
    fn ttl(&self) -> Duration;

    async fn create_with_ttl(&self, account_id: Uuid, ttl: Duration) -> Result<RefreshToken, TokenStoreError>;

    async fn create(&self, account_id: Uuid) -> Result<RefreshToken, TokenStoreError> {
        self.create_with_ttl(account_id, self.ttl()).await
    }

    /// Owner of a live token.
    async fn find(&self, token: &str) -> Result<Option<Uuid>, TokenStoreError>;

    /// Restarts the token's lifetime at the configured TTL. `false` when the
    /// token is no longer live.
    async fn touch(&self, token: &str) -> Result<bool, TokenStoreError>;

    /// Digests of the account's live tokens.
    async fn active_sessions(&self, account_id: Uuid) -> Result<Vec<String>, TokenStoreError>;

    /// Idempotent.
    async fn revoke(&self, token: &str) -> Result<(), TokenStoreError>;

    async fn revoke_all(&self, account_id: Uuid) -> Result<(), TokenStoreError>;
}
