use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{TransactionFilter, TransactionStatus};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::orchestrator::normalize_currency;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub currency: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<(TransactionFilter, i64, i64), AppError> {
        let skip = self.skip.unwrap_or(0);
        if skip < 0 {
            return Err(AppError::Validation("skip must not be negative".to_string()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }

        let status = self
            .status
            .map(|s| s.parse::<TransactionStatus>())
            .transpose()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let currency = self.currency.map(|c| normalize_currency(&c)).transpose()?;

        Ok((TransactionFilter { status, currency }, skip, limit))
    }
}

pub async fn list_transactions(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (filter, skip, limit) = query.into_filter()?;
    let transactions = state
        .transactions
        .list_for_user(user.id, &filter, skip, limit)
        .await?;

    Ok(Json(transactions))
}

pub async fn transaction_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.transactions.stats_for_user(user.id).await?;
    Ok(Json(stats))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.transactions.get_by_id(id).await?;
    if tx.user_id != user.id {
        return Err(AppError::Forbidden(
            "transaction belongs to another user".to_string(),
        ));
    }

    Ok(Json(tx))
}
