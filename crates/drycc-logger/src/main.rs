//! drycc-logger - Drycc log aggregation service
//!
//! Consumes container logs from the message bus into bounded per-application
//! storage and serves them over HTTP until SIGINT or SIGTERM.

use std::sync::Arc;

use clap::Parser;
use drycc_log_store::LogStorage;
use drycc_logger::{Logger, Settings};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Settings::parse().into_config()?;
    info!(
        storage = %config.storage.kind,
        aggregator = %config.aggregator_kind,
        bind = %config.weblog.bind_addr,
        "starting drycc-logger"
    );

    let logger = Logger::new(config)?;
    tokio::spawn(reopen_on_hangup(logger.storage()));
    logger.run(shutdown_signal()).await?;
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

/// Reopens storage handles on every SIGHUP, after external log rotation.
#[cfg(unix)]
async fn reopen_on_hangup(storage: Arc<dyn LogStorage>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(err) => {
            error!(error = %err, "failed to listen for SIGHUP");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        match storage.reopen().await {
            Ok(()) => info!("reopened log storage"),
            Err(err) => error!(error = %err, "failed to reopen log storage"),
        }
    }
}

#[cfg(not(unix))]
async fn reopen_on_hangup(_storage: Arc<dyn LogStorage>) {}
