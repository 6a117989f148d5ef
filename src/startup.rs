use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{
    InMemoryExchangeRateRepository, InMemoryGatewayConfigRepository,
    InMemoryTransactionRepository, PostgresExchangeRateRepository,
    PostgresGatewayConfigRepository, PostgresTransactionRepository,
};
use crate::config::{Config, StorageBackend};
use crate::gateways::{CollectionGatewayClient, PayoutGatewayClient, RateSourceClient};
use crate::ports::{ExchangeRateRepository, GatewayConfigRepository, TransactionRepository};
use crate::services::{OrchestratorSettings, RateCache, ReconciliationScheduler, TransactionOrchestrator};
use crate::AppState;

/// Every long-lived component, wired once from `Config`.
pub struct Services {
    pub storage: StorageBackend,
    pub pool: Option<PgPool>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub rates: Arc<RateCache>,
    pub orchestrator: Arc<TransactionOrchestrator>,
    pub scheduler: Arc<ReconciliationScheduler>,
    pub log_request_body: bool,
}

impl Services {
    pub fn app_state(&self) -> AppState {
        AppState {
            orchestrator: self.orchestrator.clone(),
            rates: self.rates.clone(),
            transactions: self.transactions.clone(),
            storage: storage_label(self.storage),
            log_request_body: self.log_request_body,
        }
    }
}

pub fn storage_label(storage: StorageBackend) -> &'static str {
    match storage {
        StorageBackend::Postgres => "postgres",
        StorageBackend::Memory => "memory",
    }
}

pub async fn build_services(config: &Config) -> Result<Services> {
    let (pool, transactions, rate_rows, gateway_configs): (
        Option<PgPool>,
        Arc<dyn TransactionRepository>,
        Arc<dyn ExchangeRateRepository>,
        Arc<dyn GatewayConfigRepository>,
    ) = match config.storage {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required when STORAGE=postgres")?;
            let pool = crate::db::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            (
                Some(pool.clone()),
                Arc::new(PostgresTransactionRepository::new(pool.clone())),
                Arc::new(PostgresExchangeRateRepository::new(pool.clone())),
                Arc::new(PostgresGatewayConfigRepository::new(pool)),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            (
                None,
                Arc::new(InMemoryTransactionRepository::new()),
                Arc::new(InMemoryExchangeRateRepository::new()),
                Arc::new(InMemoryGatewayConfigRepository::new()),
            )
        }
    };

    let rate_source = Arc::new(RateSourceClient::new(
        config.rate_source.url.clone(),
        config.local_currency.clone(),
        config.rate_source.api_key.clone(),
    ));
    let rates = Arc::new(RateCache::new(
        rate_rows,
        rate_source,
        config.rate_source.ttl,
        config.rate_source.tracked_currencies.clone(),
    ));

    let collection = Arc::new(CollectionGatewayClient::new(
        config.collection.clone(),
        gateway_configs.clone(),
    ));
    let payout = Arc::new(PayoutGatewayClient::new(config.payout.clone(), gateway_configs));

    let orchestrator = Arc::new(TransactionOrchestrator::new(
        transactions.clone(),
        rates.clone(),
        collection,
        payout,
        OrchestratorSettings::from(config),
    ));

    let scheduler = Arc::new(ReconciliationScheduler::new(
        transactions.clone(),
        orchestrator.clone(),
        rates.clone(),
        config.scheduler.clone(),
    ));

    Ok(Services {
        storage: config.storage,
        pool,
        transactions,
        rates,
        orchestrator,
        scheduler,
        log_request_body: config.log_request_body,
    })
}

pub struct ValidationReport {
    pub environment: bool,
    pub storage: bool,
    pub rate_source: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.storage && self.rate_source
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Storage Connectivity:  {}", status(self.storage));
        println!("Rate Source:           {}", status(self.rate_source));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  - {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "PASS" } else { "FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAIL"
    }
}

pub async fn validate_environment(config: &Config, services: &Services) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        storage: true,
        rate_source: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if !services.transactions.ping().await {
        report.storage = false;
        report.errors.push(format!(
            "Storage: {} backend is not reachable",
            storage_label(services.storage)
        ));
    }

    if let Err(e) = validate_rate_source(config).await {
        report.rate_source = false;
        report.errors.push(format!("Rate source: {}", e));
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.local_currency.len() != 3 {
        anyhow::bail!("LOCAL_CURRENCY must be a 3-letter currency code");
    }
    if config.rate_source.tracked_currencies.is_empty() {
        anyhow::bail!("TRACKED_CURRENCIES is empty");
    }

    url::Url::parse(&config.public_base_url).context("PUBLIC_BASE_URL is not a valid URL")?;
    url::Url::parse(&config.rate_source.url).context("RATE_SOURCE_URL is not a valid URL")?;
    url::Url::parse(config.collection.base_url())
        .context("collection gateway URL is not a valid URL")?;
    url::Url::parse(&config.payout.base_url).context("PAYOUT_BASE_URL is not a valid URL")?;

    Ok(())
}

async fn validate_rate_source(config: &Config) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let url = format!(
        "{}/{}",
        config.rate_source.url.trim_end_matches('/'),
        config.local_currency
    );
    let mut request = client.get(&url);
    if let Some(key) = &config.rate_source.api_key {
        request = request.query(&[("access_key", key)]);
    }

    let response = request.send().await.context("Failed to reach rate source")?;
    if !response.status().is_success() {
        anyhow::bail!("Rate source returned status: {}", response.status());
    }

    Ok(())
}
