use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

use crate::envelope::{self, FieldErrors};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found")]
    NotFound,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Token store error: {0}")]
    TokenStore(#[from] TokenStoreError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Failures raised by a relational account backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Unavailable(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Outcome of a failed account mutation.
#[derive(Error, Debug)]
pub enum AccountError {
    #[error("invalid account data: {0}")]
    Validation(FieldErrors),

    #[error("account not found")]
    NotFound,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures raised by a refresh token backend. A missing or expired token is
/// never an error; it is reported as `Ok(None)` by the store.
#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("Token store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored token is corrupt: {0}")]
    Corrupt(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(errors) => AppError::Validation(errors),
            AccountError::NotFound => AppError::NotFound,
            AccountError::Hashing(e) => AppError::InternalError(e),
            AccountError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
                StoreError::Corrupt(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

impl From<crate::db::password::PasswordError> for AccountError {
    fn from(err: crate::db::password::PasswordError) -> Self {
        AccountError::Hashing(err.to_string())
    }
}

impl From<sqlx::Error> for AccountError {
    fn from(err: sqlx::Error) -> Self {
        AccountError::Store(err.into())
    }
}

impl From<redis::RedisError> for TokenStoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::TypeError {
            TokenStoreError::Corrupt(err.to_string())
        } else {
            TokenStoreError::Unavailable(err.to_string())
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            AppError::Validation(errors) => envelope::render_errors(status, errors.clone()),
            AppError::Store(_) | AppError::TokenStore(_) => {
                tracing::error!(error = %self, "backing store failure");
                HttpResponse::build(status).json(json!({
                    "error": {
                        "status": status.as_u16(),
                        "message": "Service temporarily unavailable"
                    }
                }))
            }
            _ => HttpResponse::build(status).json(json!({
                "error": {
                    "status": status.as_u16(),
                    "message": self.to_string()
                }
            })),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::TokenStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ConfigError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::FieldError;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let store_err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(store_err, StoreError::Unavailable(_)));

        let account_err = AccountError::Validation(FieldErrors::new(FieldError::new("username", "TAKEN")));
        let app_err: AppError = account_err.into();
        assert!(matches!(app_err, AppError::Validation(_)));
    }

    #[test]
    fn test_redis_errors_are_infrastructure() {
        let err: TokenStoreError =
            redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")).into();
        assert!(matches!(err, TokenStoreError::Unavailable(_)));

        let err: TokenStoreError =
            redis::RedisError::from((redis::ErrorKind::TypeError, "not a string")).into();
        assert!(matches!(err, TokenStoreError::Corrupt(_)));
    }

    #[test]
    fn test_error_status_codes() {
        let err = AppError::Unauthorized("bad token".into());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = AppError::Validation(FieldErrors::new(FieldError::new("password", "INSECURE")));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = AppError::NotFound;
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = AppError::TokenStore(TokenStoreError::Unavailable("down".into()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_infrastructure_errors_are_not_field_scoped() {
        let err = AppError::Store(StoreError::Unavailable("pool closed".into()));
        let resp = err.error_response();
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("errors").is_none());
        assert_eq!(json["error"]["status"], 503);
    }

    #[actix_web::test]
    async fn test_validation_errors_render_envelope() {
        let err = AppError::Validation(FieldErrors::new(FieldError::new("username", "TAKEN")));
        let resp = err.error_response();
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            r#"{"errors":[{"field":"username","message":"TAKEN"}]}"#
        );
    }
}
