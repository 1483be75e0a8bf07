use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::envelope::render_data;
use crate::error::AppError;
use crate::security::{Domain, MatchedDomain, OriginSecurity, SecurityChain};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub account_id: Uuid,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub account_id: Uuid,
    pub audience: Domain,
}

fn bearer_token(req: &HttpRequest) -> Result<&str, AppError> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("No authorization token provided".into()))
}

pub async fn create_account(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!(username = %req.username, "Received registration request");
    let (account, token) = state
        .auth_service
        .register(&req.username, &req.password)
        .await
        .map_err(|e| {
            error!(username = %req.username, error = %e, "Registration failed");
            e
        })?;

    Ok(render_data(
        StatusCode::CREATED,
        SessionResponse {
            account_id: account.id,
            refresh_token: token.token,
        },
    ))
}

pub async fn create_session(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!(username = %req.username, "Received login request");
    let (account, token) = state
        .auth_service
        .login(&req.username, &req.password)
        .await
        .map_err(|e| {
            error!(username = %req.username, error = %e, "Login failed");
            e
        })?;

    Ok(render_data(
        StatusCode::CREATED,
        SessionResponse {
            account_id: account.id,
            refresh_token: token.token,
        },
    ))
}

pub async fn refresh_session(
    req: HttpRequest,
    audience: MatchedDomain,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = bearer_token(&req)?;
    let account = state.auth_service.refresh(token).await?;

    Ok(render_data(
        StatusCode::OK,
        RefreshResponse {
            account_id: account.id,
            audience: audience.0,
        },
    ))
}

pub async fn delete_session(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = bearer_token(&req)?;
    state.auth_service.logout(token).await?;
    Ok(render_data(StatusCode::OK, serde_json::json!({})))
}

pub async fn change_password(
    req: HttpRequest,
    body: web::Json<PasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = bearer_token(&req)?;
    let new_token = state.auth_service.change_password(token, &body.password).await?;

    Ok(render_data(
        StatusCode::OK,
        SessionResponse {
            account_id: new_token.account_id,
            refresh_token: new_token.token,
        },
    ))
}

/// Mounts the session endpoints behind origin security. `/health` stays
/// outside the gate.
pub fn configure_routes(cfg: &mut web::ServiceConfig, origin: OriginSecurity) {
    cfg.route("/health", web::get().to(crate::health_check)).service(
        web::scope("")
            .wrap(SecurityChain::new().with(origin))
            .route("/accounts", web::post().to(create_account))
            .route("/session", web::post().to(create_session))
            .route("/session", web::delete().to(delete_session))
            .route("/session/refresh", web::get().to(refresh_session))
            .route("/password", web::post().to(change_password)),
    );
}
