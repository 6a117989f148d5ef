use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::domain::TransactionStatus;
use crate::error::AppError;
use crate::ports::TransactionRepository;
use crate::services::orchestrator::{ReconcileOutcome, TransactionOrchestrator};
use crate::services::rate_cache::{RateCache, RateError, RefreshSummary};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationSummary {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Owns the two background loops: proactive rate refresh and payout
/// reconciliation. Both stop when the shared token is cancelled.
pub struct ReconciliationScheduler {
    transactions: Arc<dyn TransactionRepository>,
    orchestrator: Arc<TransactionOrchestrator>,
    rates: Arc<RateCache>,
    config: SchedulerConfig,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ReconciliationScheduler {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        orchestrator: Arc<TransactionOrchestrator>,
        rates: Arc<RateCache>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            transactions,
            orchestrator,
            rates,
            config,
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            warn!("Reconciliation scheduler already running");
            return;
        }

        let this = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let interval = this.config.rate_refresh_interval;
            let scheduler = &this;
            scheduler.run_every("rate refresh", interval, || async move {
                if let Err(e) = scheduler.refresh_rates().await {
                    error!("Rate refresh pass failed: {}", e);
                }
            })
            .await;
        }));

        let this = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let interval = this.config.payout_reconcile_interval;
            let scheduler = &this;
            scheduler.run_every("payout reconciliation", interval, || async move {
                if let Err(e) = scheduler.reconcile_payouts().await {
                    error!("Payout reconciliation pass failed: {}", e);
                }
            })
            .await;
        }));

        info!(
            rate_refresh_secs = self.config.rate_refresh_interval.as_secs(),
            payout_reconcile_secs = self.config.payout_reconcile_interval.as_secs(),
            "Reconciliation scheduler started"
        );
    }

    /// Cancels both loops and waits for them to exit.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }
        info!("Reconciliation scheduler stopped");
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    async fn run_every<F, Fut>(&self, name: &'static str, interval: Duration, mut work: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        info!("{} loop started", name);
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = work() => {}
            }
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = sleep(interval) => {}
            }
        }
        info!("{} loop stopped", name);
    }

    pub async fn refresh_rates(&self) -> Result<RefreshSummary, RateError> {
        self.rates.refresh_all().await
    }

    /// One pass over every PAYOUT_PENDING transaction. Per-item failures are
    /// logged and counted; they never abort the pass.
    pub async fn reconcile_payouts(&self) -> Result<ReconciliationSummary, AppError> {
        let pending = self
            .transactions
            .list_by_status(TransactionStatus::PayoutPending)
            .await?;

        let mut summary = ReconciliationSummary::default();
        if pending.is_empty() {
            debug!("No payouts awaiting reconciliation");
            return Ok(summary);
        }

        debug!("Reconciling {} pending payout(s)", pending.len());
        for tx in pending {
            if self.token.is_cancelled() {
                break;
            }
            summary.checked += 1;
            match self.orchestrator.reconcile_payout(tx.id).await {
                Ok(ReconcileOutcome::Completed) => summary.completed += 1,
                Ok(ReconcileOutcome::Failed) => summary.failed += 1,
                Ok(ReconcileOutcome::StillPending(_)) | Ok(ReconcileOutcome::Skipped) => {
                    summary.still_pending += 1
                }
                Err(e) => {
                    summary.errors += 1;
                    error!(transaction_id = %tx.id, error = %e, "Payout reconciliation failed");
                }
            }
        }

        info!(
            checked = summary.checked,
            completed = summary.completed,
            failed = summary.failed,
            errors = summary.errors,
            "Payout reconciliation pass finished"
        );
        Ok(summary)
    }
}
