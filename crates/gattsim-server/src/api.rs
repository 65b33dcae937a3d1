//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `gatt` - Domain values, characteristic reads, writes and notifications
//! - `devices` - Connected devices and simulated connections
//! - `advertising` - Advertising data and scan response
//! - `events` - Recent domain events
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod advertising;
pub mod devices;
pub mod error;
pub mod events;
pub mod gatt;
pub mod health;
pub mod openapi;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                         - Health check
/// /api
/// ├── /values                     - Decoded domain values
/// ├── /subscriptions              - Subscription state
/// ├── /snapshot                   - Everything at once
/// ├── /characteristics            - Characteristic table, read, write, notify
/// ├── /devices                    - Connected devices, simulated connect/disconnect
/// ├── /advertising                - Advertising payloads
/// ├── /events                     - Recent domain events
/// └── /openapi.json               - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                // OpenAPI spec at /api/openapi.json
                .route("/openapi.json", get(openapi::get_openapi_spec))
                // Values, subscriptions and characteristics
                .merge(gatt::router())
                .nest("/devices", devices::router())
                .nest("/advertising", advertising::router())
                .nest("/events", events::router()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
