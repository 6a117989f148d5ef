pub mod exchange_rate;
pub mod gateway_config;
pub mod transaction;

pub use exchange_rate::ExchangeRate;
pub use gateway_config::GatewayConfig;
pub use transaction::{
    InvalidTransition, NewTransaction, Transaction, TransactionFilter, TransactionStats,
    TransactionStatus,
};
