//! Clients for the three remote collaborators: the rate feed, the collection
//! gateway and the payout gateway. The orchestrator and scheduler depend on
//! the traits here, not on the HTTP clients.

pub mod collection;
pub mod credentials;
pub mod payout;
pub mod rate_source;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub use collection::CollectionGatewayClient;
pub use payout::PayoutGatewayClient;
pub use rate_source::RateSourceClient;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream rejected the request: {0}")]
    Rejected(String),

    #[error("invalid response from upstream: {0}")]
    InvalidResponse(String),

    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Everything the collection gateway needs to open a hosted payment page.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub tran_id: Uuid,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
    pub ipn_url: String,
    /// Passed through untouched and echoed back on every callback.
    pub foreign_amount: BigDecimal,
    pub foreign_currency: String,
    pub recipient_address: String,
}

/// Result of the collection gateway's validation endpoint. `raw` is the body
/// exactly as received.
#[derive(Debug, Clone)]
pub struct CollectionValidation {
    pub status: String,
    pub tran_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub raw: Value,
}

impl CollectionValidation {
    pub fn is_valid_status(&self) -> bool {
        matches!(self.status.as_str(), "VALID" | "VALIDATED")
    }
}

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub recipient: String,
    pub amount: BigDecimal,
    pub currency: String,
    /// Used as both the sender batch id and the item id, so a replay is
    /// recognisable by the gateway.
    pub reference_id: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PayoutBatch {
    pub batch_id: String,
    pub batch_status: String,
    pub raw: Value,
}

impl PayoutBatch {
    pub fn from_value(raw: Value) -> Result<Self, GatewayError> {
        let header = raw
            .get("batch_header")
            .ok_or_else(|| GatewayError::InvalidResponse("missing batch_header".to_string()))?;
        let batch_id = header
            .get("payout_batch_id")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidResponse("missing payout_batch_id".to_string()))?
            .to_string();
        let batch_status = header
            .get("batch_status")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();

        Ok(Self {
            batch_id,
            batch_status,
            raw,
        })
    }
}

/// Rate table as quoted by the upstream feed: one unit of `base` buys
/// `rates[code]` of each currency.
#[derive(Debug, Clone)]
pub struct RateTable {
    pub base: String,
    pub rates: HashMap<String, BigDecimal>,
}

#[async_trait]
pub trait CollectionGateway: Send + Sync {
    /// Opens a hosted payment session and returns the redirect URL.
    async fn create_session(&self, request: &SessionRequest) -> Result<String, GatewayError>;

    async fn validate(&self, val_id: &str) -> Result<CollectionValidation, GatewayError>;
}

#[async_trait]
pub trait PayoutGateway: Send + Sync {
    async fn create_payout(&self, request: &PayoutRequest) -> Result<PayoutBatch, GatewayError>;

    async fn get_payout_details(&self, batch_id: &str) -> Result<PayoutBatch, GatewayError>;
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self) -> Result<RateTable, GatewayError>;

    /// "closed" while calls are let through, "open" while they fail fast.
    fn circuit_state(&self) -> &'static str {
        "closed"
    }
}
