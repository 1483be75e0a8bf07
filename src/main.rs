use actix_web::{web, App, HttpServer};
use authn_core::auth::configure_routes;
use authn_core::{AppError, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> authn_core::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging, `RUST_LOG` overrides the default level
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    let state = AppState::new(config.clone()).await?;
    let origin = state.origin_security()?;
    info!(trusted_domains = ?origin.domains(), "Origin security configured");
    let state = web::Data::new(state);

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!("Starting server at {}:{}", config.server.host, config.server.port);

    HttpServer::new(move || {
        let origin = origin.clone();
        App::new()
            .app_data(state.clone())
            .configure(move |cfg| configure_routes(cfg, origin))
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    Ok(())
}
