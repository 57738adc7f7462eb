//! Marketplace process entry point.

use std::process::ExitCode;

use marketplace::{Config, Result};
use tokio::signal;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn run(config: Config) -> Result<()> {
    marketplace::install_metrics(&config)?;

    match config.database_url.as_deref() {
        Some(url) => {
            let (app, dispatcher) = marketplace::connect_postgres(&config, url).await?;
            marketplace::run_until(app, dispatcher, shutdown_signal()).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            let (app, dispatcher) = marketplace::in_memory(&config);
            marketplace::run_until(app, dispatcher, shutdown_signal()).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();

    if let Err(error) = marketplace::init_tracing(&config) {
        eprintln!("{error}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "marketplace stopped with an error");
            ExitCode::FAILURE
        }
    }
}
