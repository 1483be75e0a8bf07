use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{generate_token, token_digest, RefreshToken, RefreshTokenStore};
use crate::error::TokenStoreError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CREATE_ATTEMPTS: usize = 3;

fn token_key(digest: &str) -> String {
    format!("refresh:token:{digest}")
}

fn account_key(account_id: Uuid) -> String {
    format!("refresh:account:{account_id}")
}

/// Lua keeping the per-account index alive at least as long as its newest
/// token. The index TTL only ever grows, so a short-lived token issued after
/// a long-lived one cannot expire the index under the long one.
mod scripts {
    use ::redis::Script;

    /// KEYS[1] index, ARGV[1] digest, ARGV[2] ttl in ms.
    pub fn index_token() -> Script {
        Script::new(
            r#"
            redis.call('SADD', KEYS[1], ARGV[1])
            if redis.call('PTTL', KEYS[1]) < tonumber(ARGV[2]) then
                redis.call('PEXPIRE', KEYS[1], ARGV[2])
            end
            return 1
            "#,
        )
    }

    /// KEYS[1] token, KEYS[2] index, ARGV[1] digest, ARGV[2] ttl in ms.
    /// Returns 0 when the token is already gone.
    pub fn renew_token() -> Script {
        Script::new(
            r#"
            if redis.call('PEXPIRE', KEYS[1], ARGV[2]) == 0 then
                return 0
            end
            redis.call('SADD', KEYS[2], ARGV[1])
            if redis.call('PTTL', KEYS[2]) < tonumber(ARGV[2]) then
                redis.call('PEXPIRE', KEYS[2], ARGV[2])
            end
            return 1
            "#,
        )
    }
}

/// Redis expiry resolution is one millisecond; never ask for zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// [`RefreshTokenStore`] on Redis. Expiry is native (`SET .. PX .. NX`), so a
/// token vanishes from the store at the end of its lifetime and the
/// application never compares timestamps itself.
///
/// Each account also has a set of its token digests, used to list and revoke
/// sessions. The set may hold digests of expired tokens; readers filter them.
/// The set never expires before the longest-lived token it indexes.
#[derive(Clone)]
pub struct RedisRefreshTokenStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl std::fmt::Debug for RedisRefreshTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRefreshTokenStore")
            .field("connection", &"ConnectionManager")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl RedisRefreshTokenStore {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    pub async fn connect(redis_url: &str, ttl: Duration) -> Result<Self, TokenStoreError> {
        info!("Connecting to Redis refresh token store");

        let client = Client::open(redis_url)
            .map_err(|e| TokenStoreError::Unavailable(format!("Invalid Redis URL: {e}")))?;

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                TokenStoreError::Unavailable(format!(
                    "Redis connection timed out after {} seconds",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })??;

        info!("Connected to Redis refresh token store");
        Ok(Self::new(conn, ttl))
    }

    pub async fn ping(&self) -> Result<(), TokenStoreError> {
        let mut conn = self.conn.clone();
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn owner_of(&self, digest: &str) -> Result<Option<Uuid>, TokenStoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(token_key(digest)).await?;
        value
            .map(|raw| {
                Uuid::parse_str(&raw).map_err(|e| {
                    TokenStoreError::Corrupt(format!("refresh token owner `{raw}`: {e}"))
                })
            })
            .transpose()
    }
}

#[async_trait]
impl RefreshTokenStore for RedisRefreshTokenStore {
    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn create_with_ttl(&self, account_id: Uuid, ttl: Duration) -> Result<RefreshToken, TokenStoreError> {
        let mut conn = self.conn.clone();
        let millis = ttl_millis(ttl);

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let token = generate_token();
            let digest = token_digest(&token);

            let created: Option<String> = ::redis::cmd("SET")
                .arg(token_key(&digest))
                .arg(account_id.to_string())
                .arg("PX")
                .arg(millis)
                .arg("NX")
                .query_async(&mut conn)
                .await?;
            if created.is_none() {
                warn!("Refresh token collision, regenerating");
                continue;
            }

            let _: i64 = scripts::index_token()
                .key(account_key(account_id))
                .arg(&digest)
                .arg(millis)
                .invoke_async(&mut conn)
                .await?;

            debug!(%account_id, ttl_ms = millis, "Refresh token created");
            return Ok(RefreshToken::issue(account_id, token, ttl));
        }

        Err(TokenStoreError::Corrupt(
            "could not allocate a unique refresh token".to_string(),
        ))
    }

    async fn find(&self, token: &str) -> Result<Option<Uuid>, TokenStoreError> {
        self.owner_of(&token_digest(token)).await
    }

    async fn touch(&self, token: &str) -> Result<bool, TokenStoreError> {
        let digest = token_digest(token);
        let Some(account_id) = self.owner_of(&digest).await? else {
            return Ok(false);
        };

        let millis = ttl_millis(self.ttl);
        let mut conn = self.conn.clone();
        let renewed: i64 = scripts::renew_token()
            .key(token_key(&digest))
            .key(account_key(account_id))
            .arg(&digest)
            .arg(millis)
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    async fn active_sessions(&self, account_id: Uuid) -> Result<Vec<String>, TokenStoreError> {
        let mut conn = self.conn.clone();
        let index = account_key(account_id);
        let digests: Vec<String> = conn.smembers(&index).await?;

        let mut live = Vec::with_capacity(digests.len());
        let mut stale = Vec::new();
        for digest in digests {
            let exists: bool = conn.exists(token_key(&digest)).await?;
            if exists {
                live.push(digest);
            } else {
                stale.push(digest);
            }
        }

        if !stale.is_empty() {
            let _: () = conn.srem(&index, stale).await?;
        }
        Ok(live)
    }

    async fn revoke(&self, token: &str) -> Result<(), TokenStoreError> {
        let digest = token_digest(token);
        let Some(account_id) = self.owner_of(&digest).await? else {
            return Ok(());
        };

        let mut conn = self.conn.clone();
        let _: () = ::redis::pipe()
            .atomic()
            .del(token_key(&digest))
            .ignore()
            .srem(account_key(account_id), &digest)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(%account_id, "Refresh token revoked");
        Ok(())
    }

    async fn revoke_all(&self, account_id: Uuid) -> Result<(), TokenStoreError> {
        let mut conn = self.conn.clone();
        let index = account_key(account_id);
        let digests: Vec<String> = conn.smembers(&index).await?;

        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for digest in &digests {
            pipe.del(token_key(digest)).ignore();
        }
        pipe.del(&index).ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        debug!(%account_id, revoked = digests.len(), "Refresh tokens revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let id = Uuid::nil();
        assert_eq!(token_key("abc"), "refresh:token:abc");
        assert_eq!(account_key(id), format!("refresh:account:{id}"));
    }

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(60)), 60_000);
    }
}
