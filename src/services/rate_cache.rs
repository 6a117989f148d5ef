//! Read-through cache of foreign→local conversion rates.
//!
//! A fresh row is served without touching the network. Otherwise one upstream
//! table fetch per currency is allowed in flight at a time; concurrent callers
//! wait for it and then read the row it wrote. When the feed is unreachable
//! the last known row is served regardless of expiry.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::ExchangeRate;
use crate::gateways::{GatewayError, RateSource, RateTable};
use crate::ports::{ExchangeRateRepository, RepositoryError};
use crate::utils::keyed_lock::KeyedLock;

const RATE_SCALE: i64 = 8;

#[derive(Debug, Error)]
pub enum RateError {
    #[error("currency {0} is not quoted by the rate source")]
    UnknownCurrency(String),

    #[error("no exchange rate available for {0}")]
    Unavailable(String),

    #[error("rate source error: {0}")]
    Source(#[from] GatewayError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of one proactive refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub updated: Vec<String>,
    pub missing: Vec<String>,
}

pub struct RateCache {
    rates: Arc<dyn ExchangeRateRepository>,
    source: Arc<dyn RateSource>,
    ttl: ChronoDuration,
    tracked_currencies: Vec<String>,
    inflight: KeyedLock<String>,
}

impl RateCache {
    pub fn new(
        rates: Arc<dyn ExchangeRateRepository>,
        source: Arc<dyn RateSource>,
        ttl: Duration,
        tracked_currencies: Vec<String>,
    ) -> Self {
        Self {
            rates,
            source,
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::minutes(10)),
            tracked_currencies,
            inflight: KeyedLock::new(),
        }
    }

    pub async fn get_rate(&self, currency_code: &str) -> Result<ExchangeRate, RateError> {
        let code = currency_code.trim().to_uppercase();

        if let Some(rate) = self.rates.get(&code).await? {
            if rate.is_fresh(Utc::now()) {
                return Ok(rate);
            }
        }

        let _guard = self.inflight.lock(code.clone()).await;

        // Another caller may have refreshed the row while we waited.
        let cached = self.rates.get(&code).await?;
        if let Some(rate) = &cached {
            if rate.is_fresh(Utc::now()) {
                tracing::debug!(currency = %code, "rate refreshed by concurrent lookup");
                return Ok(rate.clone());
            }
        }

        let fetched = match self.source.fetch_rates().await {
            Ok(table) => self.store_from_table(&table, &code, Utc::now()).await,
            Err(e) => Err(RateError::Source(e)),
        };

        match fetched {
            Ok(rate) => {
                tracing::info!(currency = %code, rate = %rate.rate_to_local, "exchange rate refreshed");
                Ok(rate)
            }
            Err(RateError::Repository(e)) => Err(RateError::Repository(e)),
            Err(e) => match cached {
                Some(stale) => {
                    tracing::warn!(
                        currency = %code,
                        error = %e,
                        expired_at = %stale.expires_at,
                        "serving stale exchange rate"
                    );
                    Ok(stale)
                }
                None => {
                    tracing::error!(currency = %code, error = %e, "no exchange rate available");
                    match e {
                        RateError::UnknownCurrency(code) => Err(RateError::UnknownCurrency(code)),
                        _ => Err(RateError::Unavailable(code)),
                    }
                }
            },
        }
    }

    pub fn source_circuit_state(&self) -> &'static str {
        self.source.circuit_state()
    }

    /// Fetches the upstream table once and upserts every tracked or already
    /// cached currency it quotes.
    pub async fn refresh_all(&self) -> Result<RefreshSummary, RateError> {
        let mut codes: BTreeSet<String> = self
            .tracked_currencies
            .iter()
            .map(|c| c.to_uppercase())
            .collect();
        codes.extend(self.rates.list().await?.into_iter().map(|r| r.currency_code));

        let table = self.source.fetch_rates().await?;
        let now = Utc::now();
        let mut summary = RefreshSummary::default();

        for code in codes {
            match self.store_from_table(&table, &code, now).await {
                Ok(_) => summary.updated.push(code),
                Err(RateError::Repository(e)) => return Err(RateError::Repository(e)),
                Err(e) => {
                    tracing::warn!(currency = %code, error = %e, "currency skipped during rate refresh");
                    summary.missing.push(code);
                }
            }
        }

        tracing::info!(
            updated = summary.updated.len(),
            missing = summary.missing.len(),
            "exchange rates refreshed"
        );
        Ok(summary)
    }

    async fn store_from_table(
        &self,
        table: &RateTable,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<ExchangeRate, RateError> {
        let quoted = table
            .rates
            .get(code)
            .ok_or_else(|| RateError::UnknownCurrency(code.to_string()))?;

        let rate_to_local = invert(quoted).ok_or_else(|| {
            RateError::Source(GatewayError::InvalidResponse(format!(
                "zero rate quoted for {}",
                code
            )))
        })?;

        let row = ExchangeRate {
            currency_code: code.to_string(),
            rate_to_local,
            last_updated: now,
            expires_at: now + self.ttl,
            is_active: true,
        };
        Ok(self.rates.upsert(&row).await?)
    }
}

/// The feed quotes local→foreign; the cache stores foreign→local.
fn invert(quoted: &BigDecimal) -> Option<BigDecimal> {
    if quoted.is_zero() {
        return None;
    }
    Some((BigDecimal::from(1) / quoted).round(RATE_SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryExchangeRateRepository;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        calls: AtomicUsize,
        quotes: Option<HashMap<String, BigDecimal>>,
    }

    impl StubSource {
        fn quoting(pairs: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                quotes: Some(
                    pairs
                        .iter()
                        .map(|(code, rate)| (code.to_string(), rate.parse().unwrap()))
                        .collect(),
                ),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                quotes: None,
            })
        }
    }

    #[async_trait]
    impl RateSource for StubSource {
        async fn fetch_rates(&self) -> Result<RateTable, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            match &self.quotes {
                Some(rates) => Ok(RateTable {
                    base: "BDT".to_string(),
                    rates: rates.clone(),
                }),
                None => Err(GatewayError::Status {
                    status: 503,
                    body: "down".to_string(),
                }),
            }
        }
    }

    fn cache(
        repo: Arc<InMemoryExchangeRateRepository>,
        source: Arc<StubSource>,
    ) -> Arc<RateCache> {
        Arc::new(RateCache::new(
            repo,
            source,
            Duration::from_secs(600),
            vec!["USD".to_string(), "EUR".to_string()],
        ))
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let source = StubSource::quoting(&[("USD", "0.008")]);
        let cache = cache(Arc::new(InMemoryExchangeRateRepository::new()), source.clone());

        let lookups: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_rate("usd").await })
            })
            .collect();
        for lookup in lookups {
            let rate = lookup.await.unwrap().unwrap();
            assert_eq!(rate.rate_to_local, BigDecimal::from(125));
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_row_served_when_source_fails() {
        let repo = Arc::new(InMemoryExchangeRateRepository::new());
        let now = Utc::now();
        repo.upsert(&ExchangeRate {
            currency_code: "USD".to_string(),
            rate_to_local: BigDecimal::from(110),
            last_updated: now - ChronoDuration::hours(2),
            expires_at: now - ChronoDuration::hours(1),
            is_active: true,
        })
        .await
        .unwrap();

        let cache = cache(repo, StubSource::failing());
        let rate = cache.get_rate("USD").await.unwrap();
        assert_eq!(rate.rate_to_local, BigDecimal::from(110));

        let err = cache.get_rate("JPY").await.unwrap_err();
        assert!(matches!(err, RateError::Unavailable(code) if code == "JPY"));
    }

    #[tokio::test]
    async fn test_unquoted_currency_without_row_is_unknown() {
        let cache = cache(
            Arc::new(InMemoryExchangeRateRepository::new()),
            StubSource::quoting(&[("USD", "0.008")]),
        );
        let err = cache.get_rate("XYZ").await.unwrap_err();
        assert!(matches!(err, RateError::UnknownCurrency(_)));
    }

    #[tokio::test]
    async fn test_refresh_all_covers_tracked_and_cached() {
        let repo = Arc::new(InMemoryExchangeRateRepository::new());
        let now = Utc::now();
        repo.upsert(&ExchangeRate {
            currency_code: "JPY".to_string(),
            rate_to_local: "0.75".parse().unwrap(),
            last_updated: now,
            expires_at: now,
            is_active: true,
        })
        .await
        .unwrap();

        let source = StubSource::quoting(&[("USD", "0.008"), ("JPY", "1.25")]);
        let summary = cache(repo.clone(), source.clone()).refresh_all().await.unwrap();

        assert_eq!(summary.updated, vec!["JPY".to_string(), "USD".to_string()]);
        assert_eq!(summary.missing, vec!["EUR".to_string()]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let jpy = repo.get("JPY").await.unwrap().unwrap();
        assert_eq!(jpy.rate_to_local, "0.8".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn test_source_circuit_state_defaults_to_closed() {
        let cache = cache(
            Arc::new(InMemoryExchangeRateRepository::new()),
            StubSource::failing(),
        );
        assert_eq!(cache.source_circuit_state(), "closed");
    }

    #[test]
    fn test_invert_rounds_to_eight_places() {
        let rate = invert(&"0.0091".parse().unwrap()).unwrap();
        assert_eq!(rate, "109.89010989".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn test_invert_exact() {
        let rate = invert(&"0.008".parse().unwrap()).unwrap();
        assert_eq!(rate, BigDecimal::from(125));
    }

    #[test]
    fn test_invert_zero_is_rejected() {
        assert!(invert(&BigDecimal::zero()).is_none());
    }
}
