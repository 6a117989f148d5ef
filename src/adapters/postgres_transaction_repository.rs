//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionFilter, TransactionStats, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

const COLUMNS: &str = r#"
    id, user_id, status, foreign_currency, foreign_amount, exchange_rate,
    service_fee, local_amount, recipient_address, collection_val_id,
    collection_received_amount, collection_store_amount, collection_card_type,
    collection_bank_tran_id, collection_ipn_payload, collection_validation_payload,
    payout_batch_id, payout_status, payout_payload, version, created_at, updated_at
"#;

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, user_id, status, foreign_currency, foreign_amount, exchange_rate,
                service_fee, local_amount, recipient_address, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(tx.id)
        .bind(tx.user_id)
        .bind(tx.status.as_str())
        .bind(&tx.foreign_currency)
        .bind(&tx.foreign_amount)
        .bind(&tx.exchange_rate)
        .bind(&tx.service_fee)
        .bind(&tx.local_amount)
        .bind(&tx.recipient_address)
        .bind(tx.version)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain)
            .transpose()?
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn update(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions SET
                status = $3,
                collection_val_id = $4,
                collection_received_amount = $5,
                collection_store_amount = $6,
                collection_card_type = $7,
                collection_bank_tran_id = $8,
                collection_ipn_payload = $9,
                collection_validation_payload = $10,
                payout_batch_id = $11,
                payout_status = $12,
                payout_payload = $13,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(tx.id)
        .bind(tx.version)
        .bind(tx.status.as_str())
        .bind(&tx.collection_val_id)
        .bind(&tx.collection_received_amount)
        .bind(&tx.collection_store_amount)
        .bind(&tx.collection_card_type)
        .bind(&tx.collection_bank_tran_id)
        .bind(&tx.collection_ipn_payload)
        .bind(&tx.collection_validation_payload)
        .bind(&tx.payout_batch_id)
        .bind(&tx.payout_status)
        .bind(&tx.payout_payload)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_domain(),
            None => {
                // Distinguish a lost race from a missing row.
                self.get_by_id(tx.id).await?;
                Err(RepositoryError::Conflict {
                    id: tx.id,
                    expected: tx.version,
                })
            }
        }
    }

    async fn list_by_status(&self, status: TransactionStatus) -> RepositoryResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE status = $1 ORDER BY created_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        filter: &TransactionFilter,
        skip: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM transactions
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR foreign_currency = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(user_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.currency.as_deref())
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn stats_for_user(&self, user_id: i64) -> RepositoryResult<TransactionStats> {
        let successful: Vec<&str> = TransactionStatus::ALL
            .iter()
            .filter(|s| s.is_successful())
            .map(|s| s.as_str())
            .collect();
        let since = Utc::now() - Duration::days(30);

        let (total, success, recent): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = ANY($2)),
                COUNT(*) FILTER (WHERE created_at >= $3)
            FROM transactions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(&successful)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let totals: Vec<(String, BigDecimal)> = sqlx::query_as(
            r#"
            SELECT foreign_currency, SUM(foreign_amount)
            FROM transactions
            WHERE user_id = $1 AND status = $2
            GROUP BY foreign_currency
            "#,
        )
        .bind(user_id)
        .bind(TransactionStatus::PayoutCompleted.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(TransactionStats {
            total_transactions: total,
            successful_transactions: success,
            success_rate: success_rate(success, total),
            currency_totals: totals.into_iter().collect::<BTreeMap<_, _>>(),
            recent_transactions_30d: recent,
        })
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

pub(crate) fn success_rate(successful: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64 * 100.0
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: i64,
    status: String,
    foreign_currency: String,
    foreign_amount: BigDecimal,
    exchange_rate: BigDecimal,
    service_fee: BigDecimal,
    local_amount: BigDecimal,
    recipient_address: String,
    collection_val_id: Option<String>,
    collection_received_amount: Option<BigDecimal>,
    collection_store_amount: Option<BigDecimal>,
    collection_card_type: Option<String>,
    collection_bank_tran_id: Option<String>,
    collection_ipn_payload: Option<serde_json::Value>,
    collection_validation_payload: Option<serde_json::Value>,
    payout_batch_id: Option<String>,
    payout_status: Option<String>,
    payout_payload: Option<serde_json::Value>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| RepositoryError::Corrupt(format!("transaction {}: {}", self.id, e)))?;

        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            status,
            foreign_currency: self.foreign_currency,
            foreign_amount: self.foreign_amount,
            exchange_rate: self.exchange_rate,
            service_fee: self.service_fee,
            local_amount: self.local_amount,
            recipient_address: self.recipient_address,
            collection_val_id: self.collection_val_id,
            collection_received_amount: self.collection_received_amount,
            collection_store_amount: self.collection_store_amount,
            collection_card_type: self.collection_card_type,
            collection_bank_tran_id: self.collection_bank_tran_id,
            collection_ipn_payload: self.collection_ipn_payload,
            collection_validation_payload: self.collection_validation_payload,
            payout_batch_id: self.payout_batch_id,
            payout_status: self.payout_status,
            payout_payload: self.payout_payload,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
