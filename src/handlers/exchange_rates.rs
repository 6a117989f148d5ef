use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::error::AppError;
use crate::services::orchestrator::normalize_currency;
use crate::AppState;

pub async fn get_exchange_rate(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let code = normalize_currency(&code)?;
    let rate = state.rates.get_rate(&code).await?;
    Ok(Json(rate))
}
