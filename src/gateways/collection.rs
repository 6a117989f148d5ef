use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::credentials::resolve_collection_credentials;
use super::{CollectionGateway, CollectionValidation, GatewayError, SessionRequest};
use crate::config::CollectionGatewayConfig;
use crate::ports::GatewayConfigRepository;
use crate::utils::decimal;

const SESSION_PATH: &str = "/gwprocess/v4/api.php";
const VALIDATION_PATH: &str = "/validator/api/validationserverAPI.php";
/// The payer is not known to this service; the recipient must never receive
/// the gateway's payer receipts.
const PLACEHOLDER_CUSTOMER_EMAIL: &str = "customer@example.com";

/// Hosted-checkout collection gateway. Store credentials are resolved per
/// call so a `gateway_config` change takes effect without a restart.
#[derive(Clone)]
pub struct CollectionGatewayClient {
    client: Client,
    fallback: CollectionGatewayConfig,
    configs: Arc<dyn GatewayConfigRepository>,
}

impl CollectionGatewayClient {
    pub fn new(fallback: CollectionGatewayConfig, configs: Arc<dyn GatewayConfigRepository>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            fallback,
            configs,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.fallback.base_url().trim_end_matches('/'), path)
    }
}

#[async_trait]
impl CollectionGateway for CollectionGatewayClient {
    async fn create_session(&self, request: &SessionRequest) -> Result<String, GatewayError> {
        let creds = resolve_collection_credentials(self.configs.as_ref(), &self.fallback).await;

        let total_amount = request.total_amount.with_scale(2).to_string();
        let tran_id = request.tran_id.to_string();
        let foreign_amount = request.foreign_amount.to_string();
        let form: Vec<(&str, &str)> = vec![
            ("store_id", creds.store_id.as_str()),
            ("store_passwd", creds.store_password.as_str()),
            ("total_amount", total_amount.as_str()),
            ("currency", request.currency.as_str()),
            ("tran_id", tran_id.as_str()),
            ("success_url", request.success_url.as_str()),
            ("fail_url", request.fail_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            ("ipn_url", request.ipn_url.as_str()),
            ("cus_name", "Customer"),
            ("cus_email", PLACEHOLDER_CUSTOMER_EMAIL),
            ("cus_add1", "Dhaka"),
            ("cus_city", "Dhaka"),
            ("cus_country", "Bangladesh"),
            ("cus_phone", "01700000000"),
            ("shipping_method", "NO"),
            ("num_of_item", "1"),
            ("product_name", "International Payment Transfer"),
            ("product_category", "Payment"),
            ("product_profile", "general"),
            ("emi_option", "0"),
            ("multi_card_name", ""),
            ("value_a", foreign_amount.as_str()),
            ("value_b", request.foreign_currency.as_str()),
            ("value_c", request.recipient_address.as_str()),
        ];

        let response = self
            .client
            .post(self.url(SESSION_PATH))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.json::<Value>().await?;
        parse_session_response(&body)
    }

    async fn validate(&self, val_id: &str) -> Result<CollectionValidation, GatewayError> {
        let creds = resolve_collection_credentials(self.configs.as_ref(), &self.fallback).await;

        let response = self
            .client
            .get(self.url(VALIDATION_PATH))
            .query(&[
                ("val_id", val_id),
                ("store_id", creds.store_id.as_str()),
                ("store_passwd", creds.store_password.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let raw = response.json::<Value>().await?;
        Ok(parse_validation(raw))
    }
}

fn parse_session_response(body: &Value) -> Result<String, GatewayError> {
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
    if status.eq_ignore_ascii_case("SUCCESS") {
        return body
            .get("GatewayPageURL")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::InvalidResponse("missing GatewayPageURL".to_string()));
    }

    let reason = body
        .get("failedreason")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .unwrap_or("session creation failed");
    Err(GatewayError::Rejected(reason.to_string()))
}

fn parse_validation(raw: Value) -> CollectionValidation {
    let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);

    CollectionValidation {
        status: text("status").unwrap_or_default().to_uppercase(),
        tran_id: text("tran_id"),
        amount: raw.get("amount").and_then(decimal::from_json),
        currency: text("currency").or_else(|| text("currency_type")),
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_success_returns_redirect() {
        let url = parse_session_response(&json!({
            "status": "SUCCESS",
            "GatewayPageURL": "https://pay.example/checkout/abc"
        }))
        .unwrap();
        assert_eq!(url, "https://pay.example/checkout/abc");
    }

    #[test]
    fn test_session_failure_carries_reason() {
        let err = parse_session_response(&json!({
            "status": "FAILED",
            "failedreason": "Store Credential Error"
        }))
        .unwrap_err();
        match err {
            GatewayError::Rejected(reason) => assert_eq!(reason, "Store Credential Error"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_validation_reads_string_amount() {
        let validation = parse_validation(json!({
            "status": "VALID",
            "tran_id": "t-1",
            "amount": "11275.00",
            "currency": "BDT"
        }));
        assert!(validation.is_valid_status());
        assert_eq!(validation.amount, Some("11275".parse().unwrap()));
        assert_eq!(validation.currency.as_deref(), Some("BDT"));
    }
}
