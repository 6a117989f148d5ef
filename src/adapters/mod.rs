pub mod in_memory;
pub mod postgres_exchange_rate_repository;
pub mod postgres_gateway_config_repository;
pub mod postgres_transaction_repository;

pub use in_memory::{
    InMemoryExchangeRateRepository, InMemoryGatewayConfigRepository,
    InMemoryTransactionRepository,
};
pub use postgres_exchange_rate_repository::PostgresExchangeRateRepository;
pub use postgres_gateway_config_repository::PostgresGatewayConfigRepository;
pub use postgres_transaction_repository::PostgresTransactionRepository;
