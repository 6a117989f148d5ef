//! Storage ports. The orchestrator, rate cache and scheduler only talk to
//! these traits; `adapters` provides the Postgres and in-memory backends.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    ExchangeRate, GatewayConfig, Transaction, TransactionFilter, TransactionStats,
    TransactionStatus,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("version conflict on {id}: expected version {expected}")]
    Conflict { id: Uuid, expected: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction>;

    /// Persists every mutable field of `tx` if the stored version still equals
    /// `tx.version`, returning the row with its version bumped.
    async fn update(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn list_by_status(&self, status: TransactionStatus) -> RepositoryResult<Vec<Transaction>>;

    async fn list_for_user(
        &self,
        user_id: i64,
        filter: &TransactionFilter,
        skip: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<Transaction>>;

    async fn stats_for_user(&self, user_id: i64) -> RepositoryResult<TransactionStats>;

    async fn ping(&self) -> bool;
}

#[async_trait]
pub trait ExchangeRateRepository: Send + Sync {
    async fn get(&self, currency_code: &str) -> RepositoryResult<Option<ExchangeRate>>;

    /// Insert or replace the single authoritative row for the currency.
    async fn upsert(&self, rate: &ExchangeRate) -> RepositoryResult<ExchangeRate>;

    async fn list(&self) -> RepositoryResult<Vec<ExchangeRate>>;
}

#[async_trait]
pub trait GatewayConfigRepository: Send + Sync {
    async fn active(&self) -> RepositoryResult<Option<GatewayConfig>>;
}
