//! HTTP surface of the crowd-fund web application.

pub mod handlers;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use handlers::{ApiError, AppState};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/state/{var}", get(handlers::get_state_handler))
        .route("/transactions", post(handlers::submit_transaction_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
}
