use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached conversion rate from one foreign currency into the local currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub currency_code: String,
    pub rate_to_local: BigDecimal,
    pub last_updated: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl ExchangeRate {
    /// Whether the row may be used for a new calculation without refreshing.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}
