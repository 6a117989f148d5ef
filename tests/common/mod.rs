#![allow(dead_code)]

use axum::Router;
use bigdecimal::BigDecimal;
use chrono::{Duration as ChronoDuration, Utc};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use remit_bridge::adapters::{
    InMemoryExchangeRateRepository, InMemoryGatewayConfigRepository,
    InMemoryTransactionRepository,
};
use remit_bridge::config::{CollectionGatewayConfig, PayoutGatewayConfig, SchedulerConfig};
use remit_bridge::domain::{ExchangeRate, NewTransaction, Transaction, TransactionStatus};
use remit_bridge::gateways::{CollectionGatewayClient, PayoutGatewayClient, RateSourceClient};
use remit_bridge::ports::{ExchangeRateRepository, TransactionRepository};
use remit_bridge::services::{
    InitiatePayment, OrchestratorSettings, RateCache, ReconciliationScheduler,
    TransactionOrchestrator,
};
use remit_bridge::{create_app, AppState};

pub const VALIDATION_PATH: &str = "/validator/api/validationserverAPI.php";
pub const SESSION_PATH: &str = "/gwprocess/v4/api.php";

/// Real HTTP clients pointed at mockito servers, backed by in-memory storage.
pub struct Harness {
    pub rate_server: ServerGuard,
    pub collection_server: ServerGuard,
    pub payout_server: ServerGuard,
    pub transactions: Arc<InMemoryTransactionRepository>,
    pub rate_rows: Arc<InMemoryExchangeRateRepository>,
    pub gateway_configs: Arc<InMemoryGatewayConfigRepository>,
    pub rates: Arc<RateCache>,
    pub orchestrator: Arc<TransactionOrchestrator>,
    pub scheduler: Arc<ReconciliationScheduler>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_scheduler(SchedulerConfig::default()).await
    }

    pub async fn with_scheduler(scheduler_config: SchedulerConfig) -> Self {
        let rate_server = mockito::Server::new_async().await;
        let collection_server = mockito::Server::new_async().await;
        let payout_server = mockito::Server::new_async().await;

        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let rate_rows = Arc::new(InMemoryExchangeRateRepository::new());
        let gateway_configs = Arc::new(InMemoryGatewayConfigRepository::new());

        let rate_source = Arc::new(RateSourceClient::new(
            rate_server.url(),
            "BDT".to_string(),
            None,
        ));
        let rates = Arc::new(RateCache::new(
            rate_rows.clone(),
            rate_source,
            Duration::from_secs(600),
            vec!["USD".to_string(), "EUR".to_string()],
        ));

        let collection = Arc::new(CollectionGatewayClient::new(
            CollectionGatewayConfig {
                sandbox_mode: true,
                sandbox_url: collection_server.url(),
                live_url: "http://127.0.0.1:9".to_string(),
                store_id: "env-store".to_string(),
                store_password: "env-pass".to_string(),
            },
            gateway_configs.clone(),
        ));
        let payout = Arc::new(PayoutGatewayClient::new(
            PayoutGatewayConfig {
                base_url: payout_server.url(),
                client_id: "env-client".to_string(),
                client_secret: "env-secret".to_string(),
            },
            gateway_configs.clone(),
        ));

        let orchestrator = Arc::new(TransactionOrchestrator::new(
            transactions.clone(),
            rates.clone(),
            collection,
            payout,
            OrchestratorSettings {
                local_currency: "BDT".to_string(),
                public_base_url: "http://remit.test".to_string(),
            },
        ));
        let scheduler = Arc::new(ReconciliationScheduler::new(
            transactions.clone(),
            orchestrator.clone(),
            rates.clone(),
            scheduler_config,
        ));

        Self {
            rate_server,
            collection_server,
            payout_server,
            transactions,
            rate_rows,
            gateway_configs,
            rates,
            orchestrator,
            scheduler,
        }
    }

    pub fn app(&self) -> Router {
        create_app(AppState {
            orchestrator: self.orchestrator.clone(),
            rates: self.rates.clone(),
            transactions: self.transactions.clone(),
            storage: "memory",
            log_request_body: false,
        })
    }

    /// Caches a fresh rate so no rate-source call is needed.
    pub async fn seed_rate(&self, code: &str, rate: &str) {
        self.seed_rate_expiring(code, rate, ChronoDuration::minutes(10))
            .await;
    }

    pub async fn seed_rate_expiring(&self, code: &str, rate: &str, expires_in: ChronoDuration) {
        let now = Utc::now();
        self.rate_rows
            .upsert(&ExchangeRate {
                currency_code: code.to_string(),
                rate_to_local: rate.parse().unwrap(),
                last_updated: now,
                expires_at: now + expires_in,
                is_active: true,
            })
            .await
            .unwrap();
    }

    pub async fn mock_rate_table(&mut self, body: Value) -> Mock {
        self.rate_server
            .mock("GET", "/BDT")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    pub async fn mock_session(&mut self) -> Mock {
        self.collection_server
            .mock("POST", SESSION_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "status": "SUCCESS",
                    "GatewayPageURL": "https://collect.test/checkout/session-1"
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_validation(&mut self, val_id: &str, body: Value) -> Mock {
        self.collection_server
            .mock("GET", VALIDATION_PATH)
            .match_query(Matcher::UrlEncoded("val_id".into(), val_id.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    pub async fn mock_token(&mut self) -> Mock {
        self.payout_server
            .mock("POST", "/v1/oauth2/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok-1","token_type":"Bearer","expires_in":32400}"#)
            .create_async()
            .await
    }

    pub async fn mock_create_payout(&mut self, status: usize, batch_id: &str) -> Mock {
        self.payout_server
            .mock("POST", "/v1/payments/payouts")
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "batch_header": {
                        "payout_batch_id": batch_id,
                        "batch_status": "PENDING"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    pub async fn mock_payout_details(&mut self, batch_id: &str, batch_status: &str) -> Mock {
        self.payout_server
            .mock("GET", format!("/v1/payments/payouts/{}", batch_id).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "batch_header": {
                        "payout_batch_id": batch_id,
                        "batch_status": batch_status
                    },
                    "items": []
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    /// USD 100 at a cached rate of 110, collection session mocked.
    pub async fn initiate_usd_100(&mut self) -> Transaction {
        self.seed_rate("USD", "110").await;
        let _session = self.mock_session().await;

        let initiated = self
            .orchestrator
            .initiate(InitiatePayment {
                user_id: 7,
                foreign_currency: "USD".to_string(),
                foreign_amount: BigDecimal::from(100),
                recipient_address: "recipient@example.com".to_string(),
            })
            .await
            .unwrap();

        self.transactions
            .get_by_id(initiated.transaction_id)
            .await
            .unwrap()
    }

    /// Inserts a transaction already waiting on `batch_id`.
    pub async fn insert_payout_pending(&self, batch_id: Option<&str>) -> Transaction {
        let mut tx = Transaction::new(NewTransaction {
            user_id: 7,
            foreign_currency: "USD".to_string(),
            foreign_amount: BigDecimal::from(100),
            exchange_rate: BigDecimal::from(110),
            service_fee: "275.00".parse().unwrap(),
            local_amount: "11275.00".parse().unwrap(),
            recipient_address: "recipient@example.com".to_string(),
        });
        tx.status = TransactionStatus::PayoutPending;
        tx.payout_batch_id = batch_id.map(str::to_string);
        tx.payout_status = Some("PENDING".to_string());
        self.transactions.insert(&tx).await.unwrap()
    }

    pub async fn status_of(&self, tx: &Transaction) -> TransactionStatus {
        self.transactions.get_by_id(tx.id).await.unwrap().status
    }
}

pub fn valid_validation(tx: &Transaction) -> Value {
    json!({
        "status": "VALID",
        "tran_id": tx.id.to_string(),
        "val_id": "val-1",
        "amount": "11275.00",
        "store_amount": "11000.00",
        "currency": "BDT",
        "card_type": "VISA-Dutch Bangla"
    })
}

pub fn decimal(raw: &str) -> BigDecimal {
    raw.parse().unwrap()
}
