use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub locked: bool,
    pub require_new_password: bool,
    pub password_changed_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(username: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            locked: false,
            require_new_password: false,
            password_changed_at: now,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the account may start a new session at all.
    pub fn is_active(&self) -> bool {
        !self.locked && !self.is_archived()
    }
}

/// Username an archived account is renamed to, freeing the original.
pub fn archived_username(id: Uuid) -> String {
    format!("@{id}")
}
