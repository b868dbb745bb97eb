//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the shared stock engine
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and their mapping onto engine requests
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use loomledger_infra::config::LedgerConfig;

use crate::middleware::{self, RateLimiter};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub async fn build_app(config: LedgerConfig) -> anyhow::Result<Router> {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit, config.rate_window));
    let services = Arc::new(services::build_services(config).await?);

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(services))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::trace_requests))
                .layer(axum::middleware::from_fn_with_state(
                    limiter,
                    middleware::rate_limit,
                )),
        ))
}
