pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateways;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::ports::TransactionRepository;
use crate::services::{RateCache, TransactionOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TransactionOrchestrator>,
    pub rates: Arc<RateCache>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub storage: &'static str,
    pub log_request_body: bool,
}

pub fn create_app(state: AppState) -> Router {
    let request_log = middleware::request_logger::RequestLogConfig {
        log_body: state.log_request_body,
    };
    let payments = Router::new()
        .route("/calculate-cost", post(handlers::payments::calculate_cost))
        .route("/initiate", post(handlers::payments::initiate))
        .route("/ipn", post(handlers::payments::ipn))
        .route("/success", post(handlers::payments::success))
        .route("/fail", post(handlers::payments::fail))
        .route("/cancel", post(handlers::payments::cancel));

    let api = Router::new()
        .nest("/payment", payments)
        .route(
            "/exchange-rates/:code",
            get(handlers::exchange_rates::get_exchange_rate),
        )
        .route("/transactions", get(handlers::transactions::list_transactions))
        .route(
            "/transactions/stats",
            get(handlers::transactions::transaction_stats),
        )
        .route(
            "/transactions/:id",
            get(handlers::transactions::get_transaction),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .layer(axum::middleware::from_fn_with_state(
            request_log,
            middleware::request_logger::request_logger_middleware,
        ))
        .with_state(state)
}

/// CORS for the configured browser origins. Entries that are not valid
/// header values are skipped with a warning.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static(middleware::auth::USER_ID_HEADER),
        ])
}
