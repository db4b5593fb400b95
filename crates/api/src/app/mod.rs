//! HTTP API application wiring (Axum router + handler wiring).
//!
//! Folder structure:
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent envelope responses

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use courseboard_queue::JobAdmin;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(admin: JobAdmin) -> Router {
    // Protected routes: require a caller identity.
    let protected = routes::router()
        .layer(Extension(admin))
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
