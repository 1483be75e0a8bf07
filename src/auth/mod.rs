//! Account and session workflows.
//!
//! [`AuthService`] composes the account store and the refresh token store;
//! `handlers` exposes it over HTTP behind origin security.

pub mod handlers;
mod service;

pub use handlers::configure_routes;
pub use service::AuthService;
