//! In-memory repositories used by tests and `STORAGE=memory` local runs.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::postgres_transaction_repository::success_rate;
use crate::domain::{
    ExchangeRate, GatewayConfig, Transaction, TransactionFilter, TransactionStats,
    TransactionStatus,
};
use crate::ports::{
    ExchangeRateRepository, GatewayConfigRepository, RepositoryError, RepositoryResult,
    TransactionRepository,
};

/// Thread-safe transaction store with the same compare-and-set semantics on
/// `version` as the Postgres adapter.
#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let transactions = self.transactions.read().await;
        transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn update(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut transactions = self.transactions.write().await;
        let stored = transactions
            .get_mut(&tx.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", tx.id)))?;

        if stored.version != tx.version {
            return Err(RepositoryError::Conflict {
                id: tx.id,
                expected: tx.version,
            });
        }

        // Initiation facts are never rewritten.
        stored.status = tx.status;
        stored.collection_val_id = tx.collection_val_id.clone();
        stored.collection_received_amount = tx.collection_received_amount.clone();
        stored.collection_store_amount = tx.collection_store_amount.clone();
        stored.collection_card_type = tx.collection_card_type.clone();
        stored.collection_bank_tran_id = tx.collection_bank_tran_id.clone();
        stored.collection_ipn_payload = tx.collection_ipn_payload.clone();
        stored.collection_validation_payload = tx.collection_validation_payload.clone();
        stored.payout_batch_id = tx.payout_batch_id.clone();
        stored.payout_status = tx.payout_status.clone();
        stored.payout_payload = tx.payout_payload.clone();
        stored.version += 1;
        stored.updated_at = Utc::now();

        Ok(stored.clone())
    }

    async fn list_by_status(&self, status: TransactionStatus) -> RepositoryResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut matching: Vec<Transaction> = transactions
            .values()
            .filter(|tx| tx.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|tx| tx.created_at);
        Ok(matching)
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        filter: &TransactionFilter,
        skip: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut matching: Vec<Transaction> = transactions
            .values()
            .filter(|tx| tx.user_id == user_id)
            .filter(|tx| filter.status.map_or(true, |s| tx.status == s))
            .filter(|tx| {
                filter
                    .currency
                    .as_deref()
                    .map_or(true, |c| tx.foreign_currency == c)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn stats_for_user(&self, user_id: i64) -> RepositoryResult<TransactionStats> {
        let transactions = self.transactions.read().await;
        let since = Utc::now() - Duration::days(30);

        let mut total = 0;
        let mut successful = 0;
        let mut recent = 0;
        let mut currency_totals: BTreeMap<String, BigDecimal> = BTreeMap::new();

        for tx in transactions.values().filter(|tx| tx.user_id == user_id) {
            total += 1;
            if tx.status.is_successful() {
                successful += 1;
            }
            if tx.created_at >= since {
                recent += 1;
            }
            if tx.status == TransactionStatus::PayoutCompleted {
                let entry = currency_totals
                    .entry(tx.foreign_currency.clone())
                    .or_insert_with(|| BigDecimal::from(0));
                *entry = &*entry + &tx.foreign_amount;
            }
        }

        Ok(TransactionStats {
            total_transactions: total,
            successful_transactions: successful,
            success_rate: success_rate(successful, total),
            currency_totals,
            recent_transactions_30d: recent,
        })
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[derive(Default, Clone)]
pub struct InMemoryExchangeRateRepository {
    rates: Arc<RwLock<HashMap<String, ExchangeRate>>>,
}

impl InMemoryExchangeRateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExchangeRateRepository for InMemoryExchangeRateRepository {
    async fn get(&self, currency_code: &str) -> RepositoryResult<Option<ExchangeRate>> {
        Ok(self.rates.read().await.get(currency_code).cloned())
    }

    async fn upsert(&self, rate: &ExchangeRate) -> RepositoryResult<ExchangeRate> {
        self.rates
            .write()
            .await
            .insert(rate.currency_code.clone(), rate.clone());
        Ok(rate.clone())
    }

    async fn list(&self) -> RepositoryResult<Vec<ExchangeRate>> {
        let mut rates: Vec<ExchangeRate> = self.rates.read().await.values().cloned().collect();
        rates.sort_by(|a, b| a.currency_code.cmp(&b.currency_code));
        Ok(rates)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryGatewayConfigRepository {
    active: Arc<RwLock<Option<GatewayConfig>>>,
}

impl InMemoryGatewayConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_active(&self, config: Option<GatewayConfig>) {
        *self.active.write().await = config;
    }
}

#[async_trait]
impl GatewayConfigRepository for InMemoryGatewayConfigRepository {
    async fn active(&self) -> RepositoryResult<Option<GatewayConfig>> {
        Ok(self.active.read().await.clone().filter(|c| c.is_active))
    }
}
