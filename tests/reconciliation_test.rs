mod common;

use common::Harness;
use std::time::Duration;

use remit_bridge::config::SchedulerConfig;
use remit_bridge::domain::TransactionStatus;
use remit_bridge::ports::TransactionRepository;
use remit_bridge::services::ReconciliationSummary;

#[tokio::test]
async fn test_reconcile_applies_terminal_batch_statuses() {
    let mut h = Harness::new().await;
    let succeeded = h.insert_payout_pending(Some("B-1")).await;
    let denied = h.insert_payout_pending(Some("B-2")).await;
    let pending = h.insert_payout_pending(Some("B-3")).await;
    let broken = h.insert_payout_pending(Some("B-4")).await;

    let _token = h.mock_token().await;
    let _b1 = h.mock_payout_details("B-1", "SUCCESS").await;
    let _b2 = h.mock_payout_details("B-2", "DENIED").await;
    let _b3 = h.mock_payout_details("B-3", "PROCESSING").await;
    let _b4 = h
        .payout_server
        .mock("GET", "/v1/payments/payouts/B-4")
        .with_status(500)
        .create_async()
        .await;

    let summary = h.scheduler.reconcile_payouts().await.unwrap();
    assert_eq!(
        summary,
        ReconciliationSummary {
            checked: 4,
            completed: 1,
            failed: 1,
            still_pending: 1,
            errors: 1,
        }
    );

    let done = h.transactions.get_by_id(succeeded.id).await.unwrap();
    assert_eq!(done.status, TransactionStatus::PayoutCompleted);
    assert_eq!(done.payout_status.as_deref(), Some("COMPLETED"));

    let rejected = h.transactions.get_by_id(denied.id).await.unwrap();
    assert_eq!(rejected.status, TransactionStatus::PayoutFailed);
    assert_eq!(rejected.payout_status.as_deref(), Some("FAILED"));

    let waiting = h.transactions.get_by_id(pending.id).await.unwrap();
    assert_eq!(waiting.status, TransactionStatus::PayoutPending);
    assert_eq!(
        waiting.payout_payload.unwrap()["batch_header"]["batch_status"],
        "PROCESSING"
    );

    assert_eq!(h.status_of(&broken).await, TransactionStatus::PayoutPending);
}

#[tokio::test]
async fn test_reconcile_skips_missing_batch_id() {
    let mut h = Harness::new().await;
    let orphan = h.insert_payout_pending(None).await;
    let details = h
        .payout_server
        .mock("GET", mockito::Matcher::Regex(r"^/v1/payments/payouts/.*".into()))
        .expect(0)
        .create_async()
        .await;

    let summary = h.scheduler.reconcile_payouts().await.unwrap();

    assert_eq!(summary.checked, 1);
    assert_eq!(summary.still_pending, 1);
    assert_eq!(h.status_of(&orphan).await, TransactionStatus::PayoutPending);
    details.assert_async().await;
}

#[tokio::test]
async fn test_reconcile_with_nothing_pending() {
    let h = Harness::new().await;
    let summary = h.scheduler.reconcile_payouts().await.unwrap();
    assert_eq!(summary, ReconciliationSummary::default());
}

#[tokio::test]
async fn test_background_loop_completes_payout_and_shuts_down() {
    let mut h = Harness::with_scheduler(SchedulerConfig {
        rate_refresh_interval: Duration::from_secs(3600),
        payout_reconcile_interval: Duration::from_millis(50),
    })
    .await;
    let tx = h.insert_payout_pending(Some("B-LOOP")).await;

    let _rates = h
        .mock_rate_table(serde_json::json!({"rates": {"USD": 0.0091, "EUR": 0.0084}}))
        .await;
    let _token = h.mock_token().await;
    let _details = h.mock_payout_details("B-LOOP", "SUCCESS").await;

    h.scheduler.start().await;

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if h.status_of(&tx).await == TransactionStatus::PayoutCompleted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(completed.is_ok(), "payout was not reconciled in time");

    tokio::time::timeout(Duration::from_secs(5), h.scheduler.shutdown())
        .await
        .expect("scheduler did not stop");
    assert!(h.scheduler.is_cancelled());
}

#[tokio::test]
async fn test_cancelled_scheduler_stops_pass() {
    let h = Harness::new().await;
    let tx = h.insert_payout_pending(Some("B-1")).await;

    h.scheduler.shutdown().await;
    let summary = h.scheduler.reconcile_payouts().await.unwrap();

    assert_eq!(summary.checked, 0);
    assert_eq!(h.status_of(&tx).await, TransactionStatus::PayoutPending);
}

#[tokio::test]
async fn test_start_twice_is_ignored() {
    let h = Harness::new().await;
    h.scheduler.start().await;
    h.scheduler.start().await;
    h.scheduler.shutdown().await;
    assert!(h.scheduler.is_cancelled());
}
