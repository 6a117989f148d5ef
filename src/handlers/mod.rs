pub mod exchange_rates;
pub mod payments;
pub mod transactions;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub storage: String,
    pub rate_source: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let storage_ok = state.transactions.ping().await;

    let health_response = HealthStatus {
        status: if storage_ok { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: if storage_ok {
            format!("{} connected", state.storage)
        } else {
            format!("{} disconnected", state.storage)
        },
        rate_source: state.rates.source_circuit_state().to_string(),
    };

    let status_code = if storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
