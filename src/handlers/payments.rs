use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Form, Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::{CallbackForm, InitiatePayment, IpnNotification};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateCostRequest {
    pub currency_code: String,
    #[serde(deserialize_with = "crate::utils::decimal::deserialize")]
    pub amount: BigDecimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateCostResponse {
    pub total_local_amount: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub service_fee: BigDecimal,
    pub currency_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub foreign_currency_code: String,
    #[serde(deserialize_with = "crate::utils::decimal::deserialize")]
    pub foreign_amount: BigDecimal,
    pub recipient_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub redirect_url: String,
    pub transaction_id: Uuid,
}

pub async fn calculate_cost(
    State(state): State<AppState>,
    Json(payload): Json<CalculateCostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cost = state
        .orchestrator
        .calculate_cost(&payload.currency_code, &payload.amount)
        .await?;

    Ok(Json(CalculateCostResponse {
        total_local_amount: cost.total_local_amount,
        exchange_rate: cost.exchange_rate,
        service_fee: cost.service_fee,
        currency_code: cost.currency_code,
    }))
}

pub async fn initiate(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<InitiateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let initiated = state
        .orchestrator
        .initiate(InitiatePayment {
            user_id: user.id,
            foreign_currency: payload.foreign_currency_code,
            foreign_amount: payload.foreign_amount,
            recipient_address: payload.recipient_address,
        })
        .await?;

    Ok(Json(InitiateResponse {
        redirect_url: initiated.redirect_url,
        transaction_id: initiated.transaction_id,
    }))
}

/// The gateway posts IPNs form-encoded; JSON bodies are accepted as well.
pub async fn ipn(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payload = parse_ipn_body(&headers, &body)?;
    let notification = IpnNotification::from_payload(payload)?;
    state.orchestrator.handle_notification(notification).await?;

    Ok(Json(json!({ "status": "received" })))
}

pub async fn success(
    State(state): State<AppState>,
    form: Option<Form<CallbackForm>>,
) -> Result<impl IntoResponse, AppError> {
    let form = form.map(|Form(f)| f).unwrap_or_default();
    let tx = state.orchestrator.handle_success(form).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Payment completed successfully",
        "transactionId": tx.id,
    })))
}

pub async fn fail(State(state): State<AppState>, form: Option<Form<CallbackForm>>) -> impl IntoResponse {
    state
        .orchestrator
        .handle_fail(form.map(|Form(f)| f).unwrap_or_default())
        .await;

    Json(json!({ "status": "failed", "message": "Payment failed" }))
}

pub async fn cancel(
    State(state): State<AppState>,
    form: Option<Form<CallbackForm>>,
) -> impl IntoResponse {
    state
        .orchestrator
        .handle_cancel(form.map(|Form(f)| f).unwrap_or_default())
        .await;

    Json(json!({ "status": "cancelled", "message": "Payment cancelled" }))
}

fn parse_ipn_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, AppError> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(body).into_owned().collect();
        let map: Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        return Ok(Value::Object(map));
    }

    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid IPN body: {}", e)))
}
