use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{Transaction, TransactionStatus};
use crate::startup::{self, Services};

#[derive(Parser)]
#[command(name = "remit-bridge")]
#[command(about = "Remit Bridge - cross-border payment orchestration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and background loops (default)
    Serve,

    /// Transaction inspection commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Exchange rate commands
    #[command(subcommand)]
    Rates(RatesCommands),

    /// Payout commands
    #[command(subcommand)]
    Payouts(PayoutsCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Show one transaction
    Show {
        /// Transaction UUID
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },

    /// List transactions in a given status
    List {
        /// Status to filter by, e.g. PAYOUT_FAILED
        #[arg(short, long)]
        status: TransactionStatus,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum RatesCommands {
    /// Run one rate refresh pass
    Refresh,
}

#[derive(Subcommand)]
pub enum PayoutsCommands {
    /// Run one payout reconciliation pass
    Reconcile,
}

pub async fn handle_tx_show(services: &Services, tx_id: Uuid) -> anyhow::Result<()> {
    let tx = services.transactions.get_by_id(tx_id).await?;
    println!("{}", serde_json::to_string_pretty(&tx)?);
    Ok(())
}

pub async fn handle_tx_list(services: &Services, status: TransactionStatus) -> anyhow::Result<()> {
    let transactions = services.transactions.list_by_status(status).await?;

    if transactions.is_empty() {
        println!("No transactions in status {}", status);
        return Ok(());
    }

    println!(
        "{:<38} {:<18} {:>12} {:<4} {:<20} {:<30}",
        "ID", "Status", "Amount", "Ccy", "Updated", "Recipient"
    );
    println!("{}", "-".repeat(126));
    for tx in &transactions {
        print_row(tx);
    }
    println!("\n{} transaction(s)", transactions.len());

    Ok(())
}

fn print_row(tx: &Transaction) {
    println!(
        "{:<38} {:<18} {:>12} {:<4} {:<20} {:<30}",
        tx.id,
        tx.status,
        tx.foreign_amount.to_string(),
        tx.foreign_currency,
        tx.updated_at.format("%Y-%m-%d %H:%M:%S"),
        tx.recipient_address
    );
}

pub async fn handle_db_migrate(services: &Services) -> anyhow::Result<()> {
    let Some(pool) = &services.pool else {
        anyhow::bail!("db migrate requires STORAGE=postgres");
    };

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(pool).await?;
    println!("Database migrations completed");

    Ok(())
}

pub async fn handle_rates_refresh(services: &Services) -> anyhow::Result<()> {
    let summary = services.scheduler.refresh_rates().await?;

    println!("Updated: {}", summary.updated.join(", "));
    if !summary.missing.is_empty() {
        println!("Not quoted by source: {}", summary.missing.join(", "));
    }

    Ok(())
}

pub async fn handle_payouts_reconcile(services: &Services) -> anyhow::Result<()> {
    let summary = services.scheduler.reconcile_payouts().await?;

    println!("Checked:       {}", summary.checked);
    println!("Completed:     {}", summary.completed);
    println!("Failed:        {}", summary.failed);
    println!("Still pending: {}", summary.still_pending);
    println!("Errors:        {}", summary.errors);

    Ok(())
}

pub async fn handle_config_validate(config: &Config, services: &Services) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Storage: {}", startup::storage_label(config.storage));
    if let Some(url) = &config.database_url {
        println!("  Database URL: {}", mask_password(url));
    }
    println!("  Local Currency: {}", config.local_currency);
    println!("  Rate Source URL: {}", config.rate_source.url);
    println!(
        "  Tracked Currencies: {}",
        config.rate_source.tracked_currencies.join(", ")
    );
    println!("  Collection Gateway: {}", config.collection.base_url());
    println!("  Payout Gateway: {}", config.payout.base_url);

    let report = startup::validate_environment(config, services).await;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration validation failed");
    }

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
