//! HTTP route handlers for the gateway.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::Router;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use aegis_common::constants::{endpoints, WRITE_TIMEOUT_SECS};

use crate::state::AppState;

mod check;
mod token;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Monitoring
        .route(endpoints::METRICS, get(metrics))
        // Challenge issuance and solution verification
        .route(
            endpoints::TOKEN,
            get(token::get_challenge).post(token::post_solution),
        )
        .route(endpoints::CHALLENGE_INDEX, get(token::challenge_index))
        // Front-proxy sub-request entry point
        .route(endpoints::CHECK, any(check::handle))
        // Response budget; the connection-level budgets live in `server`
        .layer(TimeoutLayer::new(Duration::from_secs(WRITE_TIMEOUT_SECS)))
        .with_state(state)
}

/// Prometheus text exposition of the process counters
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
