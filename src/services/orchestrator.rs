//! Payment lifecycle driver: PENDING → IPN_RECEIVED → COMPLETED →
//! PAYOUT_PENDING → PAYOUT_COMPLETED, with the terminal failure branches.
//!
//! Every write path holds the per-transaction lock for its whole
//! read-modify-write, and the store's version check rejects a write from any
//! other process that raced us. Gateway calls happen between store writes,
//! never inside one.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{NewTransaction, Transaction, TransactionStatus};
use crate::error::AppError;
use crate::gateways::{CollectionGateway, PayoutGateway, PayoutRequest, SessionRequest};
use crate::ports::{RepositoryError, TransactionRepository};
use crate::services::rate_cache::RateCache;
use crate::utils::decimal;
use crate::utils::keyed_lock::KeyedLock;

const LOCAL_SCALE: i64 = 2;

/// Largest value the `NUMERIC(12,2)` amount columns hold.
fn max_amount() -> BigDecimal {
    BigDecimal::new(999_999_999_999i64.into(), LOCAL_SCALE)
}

/// 2.5% of the converted amount.
fn service_fee_rate() -> BigDecimal {
    BigDecimal::new(25.into(), 3)
}

/// Settings the orchestrator takes from process configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub local_currency: String,
    pub public_base_url: String,
}

impl OrchestratorSettings {
    fn callback_url(&self, kind: &str) -> String {
        format!(
            "{}/api/v1/payment/{}",
            self.public_base_url.trim_end_matches('/'),
            kind
        )
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            local_currency: config.local_currency.clone(),
            public_base_url: config.public_base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub currency_code: String,
    pub foreign_amount: BigDecimal,
    pub exchange_rate: BigDecimal,
    pub converted_amount: BigDecimal,
    pub service_fee: BigDecimal,
    pub total_local_amount: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub user_id: i64,
    pub foreign_currency: String,
    pub foreign_amount: BigDecimal,
    pub recipient_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedPayment {
    pub transaction_id: Uuid,
    pub redirect_url: String,
}

/// Server-to-server payment notification. Accepts both the gateway's
/// snake_case field names and camelCase.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpnNotification {
    #[serde(alias = "tran_id")]
    pub tran_id: String,
    #[serde(default, alias = "val_id")]
    pub val_id: Option<String>,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub amount: BigDecimal,
    #[serde(default, alias = "store_amount", deserialize_with = "decimal::deserialize_opt")]
    pub store_amount: Option<BigDecimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, alias = "card_type")]
    pub card_type: Option<String>,
    #[serde(default, alias = "bank_tran_id")]
    pub bank_tran_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl IpnNotification {
    /// Parses the notification and keeps the body verbatim for audit.
    pub fn from_payload(payload: Value) -> Result<Self, AppError> {
        let mut notification: IpnNotification = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::BadRequest(format!("invalid IPN payload: {}", e)))?;
        notification.raw = payload;
        Ok(notification)
    }
}

/// Fields posted back by the collection gateway on the browser redirects.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackForm {
    #[serde(default)]
    pub tran_id: Option<String>,
    #[serde(default)]
    pub val_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Completed,
    Failed,
    StillPending(String),
    Skipped,
}

pub struct TransactionOrchestrator {
    transactions: Arc<dyn TransactionRepository>,
    rates: Arc<RateCache>,
    collection: Arc<dyn CollectionGateway>,
    payout: Arc<dyn PayoutGateway>,
    settings: OrchestratorSettings,
    locks: KeyedLock<Uuid>,
}

impl TransactionOrchestrator {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        rates: Arc<RateCache>,
        collection: Arc<dyn CollectionGateway>,
        payout: Arc<dyn PayoutGateway>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            transactions,
            rates,
            collection,
            payout,
            settings,
            locks: KeyedLock::new(),
        }
    }

    pub async fn calculate_cost(
        &self,
        currency_code: &str,
        amount: &BigDecimal,
    ) -> Result<CostBreakdown, AppError> {
        let code = normalize_currency(currency_code)?;
        if *amount <= BigDecimal::zero() {
            return Err(AppError::Validation("amount must be greater than zero".to_string()));
        }
        if *amount > max_amount() {
            return Err(AppError::Validation(format!(
                "amount must not exceed {}",
                max_amount()
            )));
        }

        let rate = self.rates.get_rate(&code).await?;
        let converted = amount * &rate.rate_to_local;
        let fee = &converted * service_fee_rate();
        let total = (&converted + &fee).round(LOCAL_SCALE);
        if total > max_amount() {
            return Err(AppError::Validation(format!(
                "local total {} exceeds the maximum of {}",
                total,
                max_amount()
            )));
        }

        Ok(CostBreakdown {
            currency_code: code,
            foreign_amount: amount.clone(),
            exchange_rate: rate.rate_to_local,
            converted_amount: converted.round(LOCAL_SCALE),
            service_fee: fee.round(LOCAL_SCALE),
            total_local_amount: total,
        })
    }

    pub async fn initiate(&self, request: InitiatePayment) -> Result<InitiatedPayment, AppError> {
        let recipient = request.recipient_address.trim().to_string();
        if !looks_like_email(&recipient) {
            return Err(AppError::Validation(
                "recipientAddress must be an email address".to_string(),
            ));
        }
        if request.foreign_amount.round(LOCAL_SCALE) != request.foreign_amount {
            return Err(AppError::Validation(
                "foreignAmount supports at most two decimal places".to_string(),
            ));
        }

        let cost = self
            .calculate_cost(&request.foreign_currency, &request.foreign_amount)
            .await?;

        let tx = Transaction::new(NewTransaction {
            user_id: request.user_id,
            foreign_currency: cost.currency_code.clone(),
            foreign_amount: cost.foreign_amount.clone(),
            exchange_rate: cost.exchange_rate.clone(),
            service_fee: cost.service_fee.clone(),
            local_amount: cost.total_local_amount.clone(),
            recipient_address: recipient,
        });
        let tx = self.transactions.insert(&tx).await?;

        tracing::info!(
            transaction_id = %tx.id,
            currency = %tx.foreign_currency,
            local_amount = %tx.local_amount,
            "transaction created"
        );

        let session = SessionRequest {
            tran_id: tx.id,
            total_amount: tx.local_amount.clone(),
            currency: self.settings.local_currency.clone(),
            success_url: self.settings.callback_url("success"),
            fail_url: self.settings.callback_url("fail"),
            cancel_url: self.settings.callback_url("cancel"),
            ipn_url: self.settings.callback_url("ipn"),
            foreign_amount: tx.foreign_amount.clone(),
            foreign_currency: tx.foreign_currency.clone(),
            recipient_address: tx.recipient_address.clone(),
        };

        match self.collection.create_session(&session).await {
            Ok(redirect_url) => Ok(InitiatedPayment {
                transaction_id: tx.id,
                redirect_url,
            }),
            Err(e) => {
                tracing::error!(transaction_id = %tx.id, error = %e, "collection session failed");
                let _guard = self.locks.lock(tx.id).await;
                let mut failed = self.transactions.get_by_id(tx.id).await?;
                if failed.transition_to(TransactionStatus::Failed).is_ok() {
                    self.transactions.update(&failed).await?;
                }
                Err(AppError::Gateway(e))
            }
        }
    }

    pub async fn handle_notification(&self, ipn: IpnNotification) -> Result<(), AppError> {
        let id = parse_transaction_id(&ipn.tran_id)?;
        let _guard = self.locks.lock(id).await;

        let mut tx = self.transactions.get_by_id(id).await?;
        if ipn.amount != tx.local_amount {
            tracing::warn!(
                transaction_id = %id,
                expected = %tx.local_amount,
                received = %ipn.amount,
                "IPN amount mismatch"
            );
            return Err(AppError::AmountMismatch {
                expected: tx.local_amount,
                received: ipn.amount,
            });
        }

        match tx.status {
            TransactionStatus::Pending => tx.transition_to(TransactionStatus::IpnReceived)?,
            TransactionStatus::IpnReceived => {
                tracing::info!(transaction_id = %id, "duplicate IPN, payload re-recorded");
            }
            status => {
                tracing::info!(transaction_id = %id, status = %status, "IPN for settled transaction ignored");
                return Ok(());
            }
        }

        tx.collection_val_id = ipn.val_id.or(tx.collection_val_id);
        tx.collection_received_amount = Some(ipn.amount);
        tx.collection_store_amount = ipn.store_amount;
        tx.collection_card_type = ipn.card_type;
        tx.collection_bank_tran_id = ipn.bank_tran_id;
        tx.collection_ipn_payload = Some(ipn.raw);
        self.transactions.update(&tx).await?;

        tracing::info!(transaction_id = %id, status = %tx.status, "IPN recorded");
        Ok(())
    }

    /// Validates a completed collection and issues the payout. Returns the
    /// transaction as it stands afterwards.
    pub async fn handle_success(&self, form: CallbackForm) -> Result<Transaction, AppError> {
        let tran_id = non_empty(form.tran_id)
            .ok_or_else(|| AppError::BadRequest("tran_id is required".to_string()))?;
        let val_id = non_empty(form.val_id)
            .ok_or_else(|| AppError::BadRequest("val_id is required".to_string()))?;
        let id = parse_transaction_id(&tran_id)?;

        let _guard = self.locks.lock(id).await;
        let mut tx = self.transactions.get_by_id(id).await?;

        match tx.status {
            TransactionStatus::Pending | TransactionStatus::IpnReceived => {}
            // A crash between the two writes leaves COMPLETED behind; the
            // reference id keeps a repeated payout request idempotent upstream.
            TransactionStatus::Completed => return self.issue_payout(tx).await,
            TransactionStatus::PayoutPending | TransactionStatus::PayoutCompleted => {
                tracing::info!(transaction_id = %id, status = %tx.status, "duplicate success callback");
                return Ok(tx);
            }
            TransactionStatus::PayoutFailed => {
                tracing::warn!(transaction_id = %id, "success callback for failed payout");
                return Err(AppError::PayoutFailed(format!(
                    "payout for transaction {} failed",
                    id
                )));
            }
            status => {
                return Err(AppError::BadRequest(format!(
                    "transaction {} is {}",
                    id, status
                )))
            }
        }

        let validation = self.collection.validate(&val_id).await?;

        let accepted = validation.is_valid_status()
            && validation.tran_id.as_deref() == Some(tran_id.as_str())
            && validation.amount.as_ref() == Some(&tx.local_amount)
            && validation
                .currency
                .as_deref()
                .map_or(false, |c| c.eq_ignore_ascii_case(&self.settings.local_currency));

        tx.collection_val_id = Some(val_id);
        tx.collection_validation_payload = Some(validation.raw.clone());

        if !accepted {
            tracing::warn!(
                transaction_id = %id,
                gateway_status = %validation.status,
                "collection validation rejected"
            );
            tx.transition_to(TransactionStatus::ValidationFailed)?;
            self.transactions.update(&tx).await?;
            return Err(AppError::BadRequest("payment validation failed".to_string()));
        }

        tx.transition_to(TransactionStatus::Completed)?;
        let tx = self.transactions.update(&tx).await?;
        tracing::info!(transaction_id = %id, "collection validated");

        self.issue_payout(tx).await
    }

    async fn issue_payout(&self, mut tx: Transaction) -> Result<Transaction, AppError> {
        let request = PayoutRequest {
            recipient: tx.recipient_address.clone(),
            amount: tx.foreign_amount.clone(),
            currency: tx.foreign_currency.clone(),
            reference_id: tx.id.to_string(),
            note: Some(format!("International transfer {}", tx.id)),
        };

        match self.payout.create_payout(&request).await {
            Ok(batch) => {
                tx.payout_batch_id = Some(batch.batch_id.clone());
                tx.payout_status = Some("PENDING".to_string());
                tx.payout_payload = Some(batch.raw);
                tx.transition_to(TransactionStatus::PayoutPending)?;
                let tx = self.transactions.update(&tx).await?;
                tracing::info!(
                    transaction_id = %tx.id,
                    batch_id = %batch.batch_id,
                    "payout issued"
                );
                Ok(tx)
            }
            Err(e) => {
                tracing::error!(transaction_id = %tx.id, error = %e, "payout failed after collection");
                tx.payout_status = Some("FAILED".to_string());
                tx.transition_to(TransactionStatus::PayoutFailed)?;
                self.transactions.update(&tx).await?;
                Err(AppError::PayoutFailed(e.to_string()))
            }
        }
    }

    /// Marks the transaction FAILED if it is still awaiting collection.
    /// Never errors.
    pub async fn handle_fail(&self, form: CallbackForm) {
        self.close_collection(form.tran_id, TransactionStatus::Failed).await
    }

    /// Marks the transaction CANCELLED if it is still awaiting collection.
    /// Never errors.
    pub async fn handle_cancel(&self, form: CallbackForm) {
        self.close_collection(form.tran_id, TransactionStatus::Cancelled)
            .await
    }

    async fn close_collection(&self, tran_id: Option<String>, target: TransactionStatus) {
        let Some(raw_id) = non_empty(tran_id) else {
            tracing::debug!(status = %target, "callback without tran_id");
            return;
        };
        let Ok(id) = Uuid::parse_str(&raw_id) else {
            tracing::warn!(tran_id = %raw_id, status = %target, "callback for malformed tran_id");
            return;
        };

        let _guard = self.locks.lock(id).await;
        let mut tx = match self.transactions.get_by_id(id).await {
            Ok(tx) => tx,
            Err(RepositoryError::NotFound(_)) => {
                tracing::warn!(transaction_id = %id, status = %target, "callback for unknown transaction");
                return;
            }
            Err(e) => {
                tracing::error!(transaction_id = %id, error = %e, "failed to load transaction");
                return;
            }
        };

        if tx.transition_to(target).is_err() {
            tracing::info!(
                transaction_id = %id,
                current = %tx.status,
                requested = %target,
                "callback ignored for settled transaction"
            );
            return;
        }

        match self.transactions.update(&tx).await {
            Ok(_) => tracing::info!(transaction_id = %id, status = %target, "collection closed"),
            Err(e) => tracing::error!(transaction_id = %id, error = %e, "failed to record callback"),
        }
    }

    /// Polls the payout gateway for one PAYOUT_PENDING transaction and applies
    /// a terminal batch status. The details payload is stored on every poll.
    pub async fn reconcile_payout(&self, id: Uuid) -> Result<ReconcileOutcome, AppError> {
        let _guard = self.locks.lock(id).await;
        let mut tx = self.transactions.get_by_id(id).await?;

        if tx.status != TransactionStatus::PayoutPending {
            return Ok(ReconcileOutcome::Skipped);
        }
        let Some(batch_id) = tx.payout_batch_id.clone() else {
            tracing::warn!(transaction_id = %id, "PAYOUT_PENDING transaction has no batch id");
            return Ok(ReconcileOutcome::Skipped);
        };

        let details = self.payout.get_payout_details(&batch_id).await?;
        tx.payout_payload = Some(details.raw);

        let outcome = match details.batch_status.as_str() {
            "SUCCESS" => {
                tx.transition_to(TransactionStatus::PayoutCompleted)?;
                tx.payout_status = Some("COMPLETED".to_string());
                ReconcileOutcome::Completed
            }
            "DENIED" => {
                tx.transition_to(TransactionStatus::PayoutFailed)?;
                tx.payout_status = Some("FAILED".to_string());
                ReconcileOutcome::Failed
            }
            other => ReconcileOutcome::StillPending(other.to_string()),
        };
        self.transactions.update(&tx).await?;

        tracing::info!(
            transaction_id = %id,
            batch_id = %batch_id,
            batch_status = %details.batch_status,
            "payout polled"
        );
        Ok(outcome)
    }
}

fn parse_transaction_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::NotFound(format!("transaction {}", raw)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) fn normalize_currency(code: &str) -> Result<String, AppError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::Validation(format!(
            "invalid currency code '{}'",
            code
        )));
    }
    Ok(code.to_uppercase())
}

fn looks_like_email(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !address.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_fee_rate() {
        assert_eq!(service_fee_rate(), "0.025".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn test_max_amount_matches_column_bound() {
        assert_eq!(max_amount(), "9999999999.99".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency(" usd ").unwrap(), "USD");
        assert!(normalize_currency("US").is_err());
        assert!(normalize_currency("U5D").is_err());
    }

    #[test]
    fn test_looks_like_email() {
        assert!(looks_like_email("recipient@example.com"));
        assert!(!looks_like_email("recipient"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("a@example"));
        assert!(!looks_like_email("a b@example.com"));
    }

    #[test]
    fn test_ipn_accepts_gateway_field_names() {
        let ipn = IpnNotification::from_payload(json!({
            "tran_id": "abc",
            "val_id": "v-1",
            "amount": "11275.00",
            "store_amount": "11000.50",
            "card_type": "VISA-Dutch Bangla",
            "verify_sign": "ignored"
        }))
        .unwrap();
        assert_eq!(ipn.tran_id, "abc");
        assert_eq!(ipn.amount, "11275".parse::<BigDecimal>().unwrap());
        assert_eq!(ipn.store_amount, Some("11000.5".parse().unwrap()));
        assert_eq!(ipn.raw["verify_sign"], "ignored");
    }

    #[test]
    fn test_ipn_accepts_camel_case() {
        let ipn = IpnNotification::from_payload(json!({
            "tranId": "abc",
            "amount": 100,
            "bankTranId": "b-9"
        }))
        .unwrap();
        assert_eq!(ipn.bank_tran_id.as_deref(), Some("b-9"));
    }

    #[test]
    fn test_ipn_without_amount_is_bad_request() {
        let err = IpnNotification::from_payload(json!({"tran_id": "abc"})).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
