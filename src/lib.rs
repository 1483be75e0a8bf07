pub mod auth;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod security;
pub mod tokens;

use std::sync::Arc;
use actix_web::HttpResponse;
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::AuthService;
pub use db::{Account, AccountStore, Credentials, PasswordHasher, PgAccountStore, SqliteAccountStore};
pub use security::{Domain, MatchedDomain, OriginSecurity, SecurityChain};
pub use tokens::{MemoryRefreshTokenStore, RedisRefreshTokenStore, RefreshTokenStore};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    /// Connects the production backends: Postgres for accounts, Redis for
    /// refresh tokens.
    pub async fn new(config: Settings) -> Result<Self> {
        let hasher = PasswordHasher::new(config.hash_cost())
            .map_err(|e| AppError::ConfigError(e.to_string()))?;
        let credentials = Credentials::new(hasher, config.auth.password_min_length);

        let accounts = PgAccountStore::connect(
            &config.database.url,
            config.database.max_connections,
            config.acquire_timeout(),
            credentials,
        )
        .await?;
        accounts.ensure_schema().await?;

        let tokens = RedisRefreshTokenStore::connect(&config.redis.url, config.refresh_token_ttl()).await?;
        tokens.ping().await?;

        info!("Backing stores ready");
        let auth_service = AuthService::new(Arc::new(accounts), Arc::new(tokens));
        Ok(Self::from_parts(config, auth_service))
    }

    pub fn from_parts(config: Settings, auth_service: AuthService) -> Self {
        Self {
            config: Arc::new(config),
            auth_service: Arc::new(auth_service),
        }
    }

    /// Gate built from the configured trusted domains.
    pub fn origin_security(&self) -> Result<OriginSecurity> {
        Ok(OriginSecurity::new(self.config.trusted_domains()?))
    }
}
