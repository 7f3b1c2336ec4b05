//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: directory, document store and service construction
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: error to response mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (used by `main.rs` and the black-box tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState { authenticator: services.authenticator.clone() };

    // Protected routes: bearer token bound to a partner.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/base/ping", get(routes::system::ping))
        .merge(routes::auth::public_router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
