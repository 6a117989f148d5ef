use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use super::{GatewayError, RateSource, RateTable};
use crate::utils::decimal;

/// HTTP client for the upstream quote feed. The feed is queried for the whole
/// table keyed by the local currency (`GET {url}/{LOCAL}`).
#[derive(Clone)]
pub struct RateSourceClient {
    client: Client,
    base_url: String,
    local_currency: String,
    api_key: Option<String>,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl RateSourceClient {
    pub fn new(base_url: String, local_currency: String, api_key: Option<String>) -> Self {
        Self::with_circuit_breaker(base_url, local_currency, api_key, 3, 60)
    }

    /// Creates a client with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        local_currency: String,
        api_key: Option<String>,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url,
            local_currency,
            api_key,
            circuit_breaker,
        }
    }

}

#[async_trait]
impl RateSource for RateSourceClient {
    async fn fetch_rates(&self) -> Result<RateTable, GatewayError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.local_currency
        );
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let base = self.local_currency.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let mut request = client.get(&url);
                if let Some(key) = api_key {
                    request = request.query(&[("access_key", key)]);
                }

                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(GatewayError::Status {
                        status: status.as_u16(),
                        body: response.text().await.unwrap_or_default(),
                    });
                }

                let body = response.json::<Value>().await?;
                parse_rate_table(base, &body)
            })
            .await;

        match result {
            Ok(table) => Ok(table),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "rate source circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }
}

fn parse_rate_table(base: String, body: &Value) -> Result<RateTable, GatewayError> {
    let rates = body
        .get("rates")
        .and_then(Value::as_object)
        .ok_or_else(|| GatewayError::InvalidResponse("missing rates table".to_string()))?;

    let rates: HashMap<_, _> = rates
        .iter()
        .filter_map(|(code, value)| decimal::from_json(value).map(|rate| (code.to_uppercase(), rate)))
        .collect();

    Ok(RateTable { base, rates })
}
