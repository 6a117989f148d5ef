use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::credentials::{resolve_payout_credentials, PayoutCredentials};
use super::{GatewayError, PayoutBatch, PayoutGateway, PayoutRequest};
use crate::config::PayoutGatewayConfig;
use crate::ports::GatewayConfigRepository;

/// Tokens are treated as expired this long before the gateway says so.
const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    client_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Payout gateway client. Bearer tokens are fetched with the client
/// credentials grant and reused until shortly before expiry.
#[derive(Clone)]
pub struct PayoutGatewayClient {
    client: Client,
    fallback: PayoutGatewayConfig,
    configs: Arc<dyn GatewayConfigRepository>,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl PayoutGatewayClient {
    pub fn new(fallback: PayoutGatewayConfig, configs: Arc<dyn GatewayConfigRepository>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            fallback,
            configs,
            token: Arc::new(Mutex::new(None)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.fallback.base_url.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let creds = resolve_payout_credentials(self.configs.as_ref(), &self.fallback).await;

        // Held across the fetch so concurrent callers share one token request.
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.client_id == creds.client_id && token.expires_at > Utc::now() {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.fetch_token(&creds).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn fetch_token(&self, creds: &PayoutCredentials) -> Result<CachedToken, GatewayError> {
        tracing::debug!("requesting payout gateway access token");

        let response = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .header("Accept", "application/json")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("token response: {}", e)))?;

        let lifetime = body.expires_in.unwrap_or(0) - TOKEN_EXPIRY_SKEW_SECS;
        Ok(CachedToken {
            token: body.access_token,
            client_id: creds.client_id.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime.max(0)),
        })
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Sends an authorised request, refreshing the token once if the gateway
    /// answers 401.
    async fn send_authorized<F>(&self, build: F) -> Result<Value, GatewayError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut retried = false;
        loop {
            let token = self.access_token().await?;
            let response = build(&self.client).bearer_auth(&token).send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                tracing::warn!("payout gateway rejected cached token, refreshing");
                self.invalidate_token().await;
                retried = true;
                continue;
            }

            if !status.is_success() {
                return Err(GatewayError::Status {
                    status: status.as_u16(),
                    body: response.text().await.unwrap_or_default(),
                });
            }

            return Ok(response.json::<Value>().await?);
        }
    }
}

fn payout_body(request: &PayoutRequest) -> Value {
    json!({
        "sender_batch_header": {
            "sender_batch_id": request.reference_id,
            "email_subject": "Payment from International Transfer",
            "email_message": "You have received a payment",
        },
        "items": [{
            "recipient_type": "EMAIL",
            "amount": {
                "value": request.amount.with_scale(2).to_string(),
                "currency": request.currency,
            },
            "note": request.note.clone().unwrap_or_else(|| "International transfer".to_string()),
            "sender_item_id": request.reference_id,
            "receiver": request.recipient,
        }],
    })
}

#[async_trait]
impl PayoutGateway for PayoutGatewayClient {
    async fn create_payout(&self, request: &PayoutRequest) -> Result<PayoutBatch, GatewayError> {
        let url = self.url("/v1/payments/payouts");
        let body = payout_body(request);

        let raw = self
            .send_authorized(|client| client.post(&url).json(&body))
            .await?;
        let batch = PayoutBatch::from_value(raw)?;

        tracing::info!(
            batch_id = %batch.batch_id,
            batch_status = %batch.batch_status,
            reference_id = %request.reference_id,
            "payout batch created"
        );
        Ok(batch)
    }

    async fn get_payout_details(&self, batch_id: &str) -> Result<PayoutBatch, GatewayError> {
        let url = self.url(&format!("/v1/payments/payouts/{}", batch_id));
        let raw = self.send_authorized(|client| client.get(&url)).await?;
        PayoutBatch::from_value(raw)
    }
}
