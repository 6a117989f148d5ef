use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use remit_bridge::cli::{
    self, Cli, Commands, DbCommands, PayoutsCommands, RatesCommands, TxCommands,
};
use remit_bridge::config::{Config, LogFormat, StorageBackend};
use remit_bridge::startup::{self, Services};
use remit_bridge::{cors_layer, create_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let services = startup::build_services(&config).await?;

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config, services).await,
        Commands::Tx(TxCommands::Show { tx_id }) => cli::handle_tx_show(&services, tx_id).await,
        Commands::Tx(TxCommands::List { status }) => cli::handle_tx_list(&services, status).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&services).await,
        Commands::Rates(RatesCommands::Refresh) => cli::handle_rates_refresh(&services).await,
        Commands::Payouts(PayoutsCommands::Reconcile) => {
            cli::handle_payouts_reconcile(&services).await
        }
        Commands::Config => cli::handle_config_validate(&config, &services).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: &Config, services: Services) -> anyhow::Result<()> {
    if let Some(pool) = &services.pool {
        remit_bridge::db::run_migrations(pool).await?;
    }
    if config.storage == StorageBackend::Memory {
        tracing::info!("Skipping migrations for in-memory storage");
    }

    services.scheduler.start().await;

    let app = create_app(services.app_state()).layer(cors_layer(&config.cors_allowed_origins));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, shutting down background loops");
    services.scheduler.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
