//! Shared harness: the real routes over SQLite in memory and the in-memory
//! refresh token store, with cheap password hashing.
#![allow(dead_code)]

use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, web, App, Error};
use actix_http::Request;
use authn_core::auth::configure_routes;
use authn_core::db::{Credentials, PasswordHasher, SqliteAccountStore};
use authn_core::{AppState, AuthService, MemoryRefreshTokenStore, Settings};
use serde_json::Value;

pub const TRUSTED_ORIGIN: &str = "https://app.example.com";
pub const PASSWORD: &str = "correct-horse";

pub fn settings() -> Settings {
    Settings::new_for_test().expect("Failed to load test config")
}

pub fn credentials(settings: &Settings) -> Credentials {
    let hasher = PasswordHasher::new(settings.hash_cost()).expect("valid test hash cost");
    Credentials::new(hasher, settings.auth.password_min_length)
}

pub async fn accounts(settings: &Settings) -> SqliteAccountStore {
    SqliteAccountStore::in_memory(credentials(settings))
        .await
        .expect("Failed to open in-memory account store")
}

pub async fn state() -> AppState {
    let settings = settings();
    let accounts = accounts(&settings).await;
    let tokens = MemoryRefreshTokenStore::new(settings.refresh_token_ttl());
    AppState::from_parts(settings, AuthService::new(Arc::new(accounts), Arc::new(tokens)))
}

pub async fn app() -> impl Service<Request, Response = ServiceResponse, Error = Error> {
    let state = state().await;
    let origin = state.origin_security().expect("valid trusted domains");
    test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(move |cfg| configure_routes(cfg, origin)),
    )
    .await
}

pub fn assert_code<B>(resp: &ServiceResponse<B>, code: u16) {
    assert_eq!(resp.status().as_u16(), code, "unexpected status code");
}

pub async fn assert_body<B: MessageBody>(resp: ServiceResponse<B>, expected: &str) {
    let body = test::read_body(resp).await;
    assert_eq!(String::from_utf8_lossy(&body), expected);
}

/// Asserts an error envelope with exactly these `(field, message)` pairs.
pub async fn assert_errors<B: MessageBody>(resp: ServiceResponse<B>, expected: &[(&str, &str)]) {
    let body: Value = test::read_body_json(resp).await;
    assert!(body.get("result").is_none(), "error envelope carried a result: {body}");
    let errors: Vec<(String, String)> = body["errors"]
        .as_array()
        .unwrap_or_else(|| panic!("no errors in {body}"))
        .iter()
        .map(|e| {
            (
                e["field"].as_str().unwrap_or_default().to_string(),
                e["message"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let expected: Vec<(String, String)> = expected
        .iter()
        .map(|(f, m)| (f.to_string(), m.to_string()))
        .collect();
    assert_eq!(errors, expected);
}

/// Returns the `result` member of a success envelope.
pub async fn assert_result<B: MessageBody>(resp: ServiceResponse<B>) -> Value {
    let body: Value = test::read_body_json(resp).await;
    assert!(body.get("errors").is_none(), "success envelope carried errors: {body}");
    body.get("result")
        .cloned()
        .unwrap_or_else(|| panic!("no result in {body}"))
}
