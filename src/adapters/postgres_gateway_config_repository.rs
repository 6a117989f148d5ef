use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::GatewayConfig;
use crate::ports::{GatewayConfigRepository, RepositoryResult};

#[derive(Clone)]
pub struct PostgresGatewayConfigRepository {
    pool: PgPool,
}

impl PostgresGatewayConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GatewayConfigRepository for PostgresGatewayConfigRepository {
    async fn active(&self) -> RepositoryResult<Option<GatewayConfig>> {
        let row = sqlx::query_as::<_, (i64, String, String, String, String, String, Option<String>, bool)>(
            r#"
            SELECT id, payout_account_email, payout_client_id, payout_client_secret,
                   collection_store_id, collection_store_password, rate_source_api_key, is_active
            FROM gateway_config
            WHERE is_active = TRUE
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(
                id,
                payout_account_email,
                payout_client_id,
                payout_client_secret,
                collection_store_id,
                collection_store_password,
                rate_source_api_key,
                is_active,
            )| GatewayConfig {
                id,
                payout_account_email,
                payout_client_id,
                payout_client_secret,
                collection_store_id,
                collection_store_password,
                rate_source_api_key,
                is_active,
            },
        ))
    }
}
