use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub public_base_url: String,
    pub local_currency: String,
    pub cors_allowed_origins: Vec<String>,
    pub rate_source: RateSourceConfig,
    pub collection: CollectionGatewayConfig,
    pub payout: PayoutGatewayConfig,
    pub scheduler: SchedulerConfig,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateSourceConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub ttl: Duration,
    pub tracked_currencies: Vec<String>,
}

/// Env-level fallback for the collection gateway. An active `gateway_config`
/// row takes precedence over the credentials here.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionGatewayConfig {
    pub sandbox_mode: bool,
    pub sandbox_url: String,
    pub live_url: String,
    pub store_id: String,
    pub store_password: String,
}

impl CollectionGatewayConfig {
    pub fn base_url(&self) -> &str {
        if self.sandbox_mode {
            &self.sandbox_url
        } else {
            &self.live_url
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PayoutGatewayConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub rate_refresh_interval: Duration,
    pub payout_reconcile_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate_refresh_interval: Duration::from_secs(3600),
            payout_reconcile_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let storage = match env::var("STORAGE")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => anyhow::bail!("STORAGE must be 'postgres' or 'memory', got '{}'", other),
        };

        let database_url = env::var("DATABASE_URL").ok();
        if storage == StorageBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when STORAGE=postgres");
        }

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            storage,
            database_url,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            local_currency: env::var("LOCAL_CURRENCY")
                .unwrap_or_else(|_| "BDT".to_string())
                .to_uppercase(),
            cors_allowed_origins: parse_list(
                &env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:8000".to_string()),
            ),
            rate_source: RateSourceConfig {
                url: env::var("RATE_SOURCE_URL")
                    .unwrap_or_else(|_| "https://api.exchangerate-api.com/v4/latest".to_string()),
                api_key: env::var("RATE_SOURCE_API_KEY").ok().filter(|k| !k.is_empty()),
                ttl: Duration::from_secs(parse_secs("RATE_TTL_SECS", 600)?),
                tracked_currencies: parse_list(
                    &env::var("TRACKED_CURRENCIES").unwrap_or_else(|_| "USD,EUR,GBP".to_string()),
                )
                .into_iter()
                .map(|c| c.to_uppercase())
                .collect(),
            },
            collection: CollectionGatewayConfig {
                sandbox_mode: env::var("COLLECTION_SANDBOX_MODE")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .context("COLLECTION_SANDBOX_MODE must be true or false")?,
                sandbox_url: env::var("COLLECTION_SANDBOX_URL")
                    .unwrap_or_else(|_| "https://sandbox.sslcommerz.com".to_string()),
                live_url: env::var("COLLECTION_LIVE_URL")
                    .unwrap_or_else(|_| "https://securepay.sslcommerz.com".to_string()),
                store_id: env::var("COLLECTION_STORE_ID").context("COLLECTION_STORE_ID is required")?,
                store_password: env::var("COLLECTION_STORE_PASSWORD")
                    .context("COLLECTION_STORE_PASSWORD is required")?,
            },
            payout: PayoutGatewayConfig {
                base_url: env::var("PAYOUT_BASE_URL")
                    .unwrap_or_else(|_| "https://api.sandbox.paypal.com".to_string()),
                client_id: env::var("PAYOUT_CLIENT_ID").context("PAYOUT_CLIENT_ID is required")?,
                client_secret: env::var("PAYOUT_CLIENT_SECRET")
                    .context("PAYOUT_CLIENT_SECRET is required")?,
            },
            scheduler: SchedulerConfig {
                rate_refresh_interval: parse_interval(
                    "RATE_REFRESH_INTERVAL_SECS",
                    env::var("RATE_REFRESH_INTERVAL_SECS").ok(),
                    3600,
                )?,
                payout_reconcile_interval: parse_interval(
                    "PAYOUT_RECONCILE_INTERVAL_SECS",
                    env::var("PAYOUT_RECONCILE_INTERVAL_SECS").ok(),
                    300,
                )?,
            },
            log_format,
            log_request_body: env::var("LOG_REQUEST_BODY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("LOG_REQUEST_BODY must be true or false")?,
        })
    }
}

fn parse_secs(key: &str, default: u64) -> anyhow::Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a whole number of seconds", key)),
        Err(_) => Ok(default),
    }
}

/// Scheduler periods must be non-zero or the job loop never sleeps.
fn parse_interval(key: &str, raw: Option<String>, default: u64) -> anyhow::Result<Duration> {
    let secs = match raw {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a whole number of seconds", key))?,
        None => default,
    };
    anyhow::ensure!(secs > 0, "{} must be greater than zero", key);
    Ok(Duration::from_secs(secs))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
