pub mod orchestrator;
pub mod rate_cache;
pub mod scheduler;

pub use orchestrator::{
    CallbackForm, CostBreakdown, InitiatePayment, InitiatedPayment, IpnNotification,
    OrchestratorSettings, ReconcileOutcome, TransactionOrchestrator,
};
pub use rate_cache::{RateCache, RateError, RefreshSummary};
pub use scheduler::{ReconciliationScheduler, ReconciliationSummary};
