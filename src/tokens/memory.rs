use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::{generate_token, token_digest, RefreshToken, RefreshTokenStore};
use crate::error::TokenStoreError;

#[derive(Debug, Clone, Copy)]
struct Entry {
    account_id: Uuid,
    expires_at: Instant,
}

/// Far enough out to treat as "never" when `now + ttl` would overflow.
const MAX_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl).unwrap_or_else(|| now + MAX_LIFETIME)
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process [`RefreshTokenStore`]. Expired entries are dropped lazily the
/// next time they are looked at, so expiry never depends on a sweeper.
#[derive(Debug)]
pub struct MemoryRefreshTokenStore {
    ttl: Duration,
    tokens: RwLock<HashMap<String, Entry>>,
}

impl MemoryRefreshTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Drops every expired entry. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, entry| entry.is_live(now));
        before - tokens.len()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn create_with_ttl(&self, account_id: Uuid, ttl: Duration) -> Result<RefreshToken, TokenStoreError> {
        let mut tokens = self.tokens.write().await;
        let token = loop {
            let candidate = generate_token();
            let digest = token_digest(&candidate);
            if !tokens.contains_key(&digest) {
                tokens.insert(
                    digest,
                    Entry {
                        account_id,
                        expires_at: expiry(Instant::now(), ttl),
                    },
                );
                break candidate;
            }
        };

        debug!(%account_id, ttl_secs = ttl.as_secs(), "Refresh token created");
        Ok(RefreshToken::issue(account_id, token, ttl))
    }

    async fn find(&self, token: &str) -> Result<Option<Uuid>, TokenStoreError> {
        let digest = token_digest(token);
        let now = Instant::now();

        let entry = self.tokens.read().await.get(&digest).copied();
        match entry {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.account_id)),
            Some(_) => {
                let mut tokens = self.tokens.write().await;
                if tokens.get(&digest).map_or(false, |e| !e.is_live(now)) {
                    tokens.remove(&digest);
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn touch(&self, token: &str) -> Result<bool, TokenStoreError> {
        let now = Instant::now();
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&token_digest(token)) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = expiry(now, self.ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn active_sessions(&self, account_id: Uuid) -> Result<Vec<String>, TokenStoreError> {
        let now = Instant::now();
        let tokens = self.tokens.read().await;
        Ok(tokens
            .iter()
            .filter(|(_, entry)| entry.account_id == account_id && entry.is_live(now))
            .map(|(digest, _)| digest.clone())
            .collect())
    }

    async fn revoke(&self, token: &str) -> Result<(), TokenStoreError> {
        self.tokens.write().await.remove(&token_digest(token));
        Ok(())
    }

    async fn revoke_all(&self, account_id: Uuid) -> Result<(), TokenStoreError> {
        self.tokens
            .write()
            .await
            .retain(|_, entry| entry.account_id != account_id);
        Ok(())
    }
}
