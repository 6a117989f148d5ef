//! Transaction domain entity.
//! Framework-agnostic record of one cross-border payment attempt.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    IpnReceived,
    Completed,
    PayoutPending,
    PayoutCompleted,
    ValidationFailed,
    PayoutFailed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 9] = [
        TransactionStatus::Pending,
        TransactionStatus::IpnReceived,
        TransactionStatus::Completed,
        TransactionStatus::PayoutPending,
        TransactionStatus::PayoutCompleted,
        TransactionStatus::ValidationFailed,
        TransactionStatus::PayoutFailed,
        TransactionStatus::Failed,
        TransactionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::IpnReceived => "IPN_RECEIVED",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::PayoutPending => "PAYOUT_PENDING",
            TransactionStatus::PayoutCompleted => "PAYOUT_COMPLETED",
            TransactionStatus::ValidationFailed => "VALIDATION_FAILED",
            TransactionStatus::PayoutFailed => "PAYOUT_FAILED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::PayoutCompleted
                | TransactionStatus::PayoutFailed
                | TransactionStatus::ValidationFailed
                | TransactionStatus::Failed
                | TransactionStatus::Cancelled
        )
    }

    /// Statuses counted as a successful collection in user statistics.
    pub fn is_successful(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::PayoutPending
                | TransactionStatus::PayoutCompleted
        )
    }

    /// Forward-only transition table of the payment lifecycle.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match (self, next) {
            (Pending, IpnReceived) => true,
            (Pending | IpnReceived, Completed) => true,
            (Pending | IpnReceived, ValidationFailed) => true,
            (Pending | IpnReceived, Failed) => true,
            (Pending | IpnReceived, Cancelled) => true,
            (Completed, PayoutPending) => true,
            (Completed, PayoutFailed) => true,
            (PayoutPending, PayoutCompleted) => true,
            (PayoutPending, PayoutFailed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

/// Domain entity representing a transaction.
///
/// `id`, the requested currency/amount, the rate and the calculated local
/// amount are fixed at initiation. Everything else is written by gateway
/// callbacks and the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: i64,
    pub status: TransactionStatus,
    pub foreign_currency: String,
    pub foreign_amount: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub service_fee: BigDecimal,
    pub local_amount: BigDecimal,
    pub recipient_address: String,
    pub collection_val_id: Option<String>,
    pub collection_received_amount: Option<BigDecimal>,
    pub collection_store_amount: Option<BigDecimal>,
    pub collection_card_type: Option<String>,
    pub collection_bank_tran_id: Option<String>,
    pub collection_ipn_payload: Option<serde_json::Value>,
    pub collection_validation_payload: Option<serde_json::Value>,
    pub payout_batch_id: Option<String>,
    pub payout_status: Option<String>,
    pub payout_payload: Option<serde_json::Value>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable facts captured when a payment is initiated.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub foreign_currency: String,
    pub foreign_amount: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub service_fee: BigDecimal,
    pub local_amount: BigDecimal,
    pub recipient_address: String,
}

impl Transaction {
    pub fn new(input: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            status: TransactionStatus::Pending,
            foreign_currency: input.foreign_currency,
            foreign_amount: input.foreign_amount,
            exchange_rate: input.exchange_rate,
            service_fee: input.service_fee,
            local_amount: input.local_amount,
            recipient_address: input.recipient_address,
            collection_val_id: None,
            collection_received_amount: None,
            collection_store_amount: None,
            collection_card_type: None,
            collection_bank_tran_id: None,
            collection_ipn_payload: None,
            collection_validation_payload: None,
            payout_batch_id: None,
            payout_status: None,
            payout_payload: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition_to(&mut self, next: TransactionStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    pub total_transactions: i64,
    pub successful_transactions: i64,
    pub success_rate: f64,
    pub currency_totals: std::collections::BTreeMap<String, BigDecimal>,
    pub recent_transactions_30d: i64,
}
