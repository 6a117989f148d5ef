//! Credential precedence for the gateways: an active `gateway_config` row
//! wins over the environment-level fallback.

use crate::config::{CollectionGatewayConfig, PayoutGatewayConfig};
use crate::ports::GatewayConfigRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionCredentials {
    pub store_id: String,
    pub store_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutCredentials {
    pub client_id: String,
    pub client_secret: String,
}

pub async fn resolve_collection_credentials(
    repo: &dyn GatewayConfigRepository,
    fallback: &CollectionGatewayConfig,
) -> CollectionCredentials {
    match repo.active().await {
        Ok(Some(row)) => {
            return CollectionCredentials {
                store_id: row.collection_store_id,
                store_password: row.collection_store_password,
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "gateway config lookup failed, using env credentials"),
    }

    CollectionCredentials {
        store_id: fallback.store_id.clone(),
        store_password: fallback.store_password.clone(),
    }
}

pub async fn resolve_payout_credentials(
    repo: &dyn GatewayConfigRepository,
    fallback: &PayoutGatewayConfig,
) -> PayoutCredentials {
    match repo.active().await {
        Ok(Some(row)) => {
            return PayoutCredentials {
                client_id: row.payout_client_id,
                client_secret: row.payout_client_secret,
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "gateway config lookup failed, using env credentials"),
    }

    PayoutCredentials {
        client_id: fallback.client_id.clone(),
        client_secret: fallback.client_secret.clone(),
    }
}
