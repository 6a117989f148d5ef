/// Operator-managed gateway credentials. When a row is active it overrides the
/// environment-level fallback in [`crate::config::Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub id: i64,
    pub payout_account_email: String,
    pub payout_client_id: String,
    pub payout_client_secret: String,
    pub collection_store_id: String,
    pub collection_store_password: String,
    pub rate_source_api_key: Option<String>,
    pub is_active: bool,
}
