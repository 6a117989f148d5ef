use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::ExchangeRate;
use crate::ports::{ExchangeRateRepository, RepositoryResult};

#[derive(Clone)]
pub struct PostgresExchangeRateRepository {
    pool: PgPool,
}

impl PostgresExchangeRateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExchangeRateRepository for PostgresExchangeRateRepository {
    async fn get(&self, currency_code: &str) -> RepositoryResult<Option<ExchangeRate>> {
        let row = sqlx::query_as::<_, ExchangeRateRow>(
            r#"
            SELECT currency_code, rate_to_local, last_updated, expires_at, is_active
            FROM exchange_rates
            WHERE currency_code = $1
            "#,
        )
        .bind(currency_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn upsert(&self, rate: &ExchangeRate) -> RepositoryResult<ExchangeRate> {
        let row = sqlx::query_as::<_, ExchangeRateRow>(
            r#"
            INSERT INTO exchange_rates (currency_code, rate_to_local, last_updated, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (currency_code) DO UPDATE SET
                rate_to_local = EXCLUDED.rate_to_local,
                last_updated = EXCLUDED.last_updated,
                expires_at = EXCLUDED.expires_at,
                is_active = EXCLUDED.is_active
            RETURNING currency_code, rate_to_local, last_updated, expires_at, is_active
            "#,
        )
        .bind(&rate.currency_code)
        .bind(&rate.rate_to_local)
        .bind(rate.last_updated)
        .bind(rate.expires_at)
        .bind(rate.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list(&self) -> RepositoryResult<Vec<ExchangeRate>> {
        let rows = sqlx::query_as::<_, ExchangeRateRow>(
            r#"
            SELECT currency_code, rate_to_local, last_updated, expires_at, is_active
            FROM exchange_rates
            ORDER BY currency_code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExchangeRateRow {
    currency_code: String,
    rate_to_local: bigdecimal::BigDecimal,
    last_updated: chrono::DateTime<chrono::Utc>,
    expires_at: chrono::DateTime<chrono::Utc>,
    is_active: bool,
}

impl From<ExchangeRateRow> for ExchangeRate {
    fn from(row: ExchangeRateRow) -> Self {
        ExchangeRate {
            currency_code: row.currency_code,
            rate_to_local: row.rate_to_local,
            last_updated: row.last_updated,
            expires_at: row.expires_at,
            is_active: row.is_active,
        }
    }
}
