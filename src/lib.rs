use backon::{ExponentialBuilder, Retryable};
use rocket::Config;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

pub mod api;
pub mod chain;
pub mod env;
pub mod error;
pub mod ingest;
pub mod matcher;
pub mod network;
pub mod scanner;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub mod test_utils;

use crate::chain::WsChainClient;
use crate::env::Env;
use crate::error::{ChainError, ConfigError};
use crate::network::Network;
use crate::scanner::{BlockScanner, ScannerConfig};
use crate::scheduler::NotificationScheduler;

const RESTART_MIN_DELAY: Duration = Duration::from_secs(1);
const RESTART_MAX_DELAY: Duration = Duration::from_secs(60);

pub async fn launch(env: Env) -> anyhow::Result<()> {
    let endpoints = env.chain.endpoints();
    if endpoints.is_empty() {
        return Err(ConfigError::NoEndpoints.into());
    }
    let pusher = env.get_pusher()?;

    let pool = env.get_sqlite_pool().await?;

    // Run database migrations to ensure all tables exist
    sqlx::migrate!().run(&pool).await?;

    let config = Config::figment()
        .merge(("port", env.server_port))
        .merge(("address", "0.0.0.0"));

    let rocket = rocket::custom(config)
        .mount("/", api::routes())
        .manage(pool.clone())
        .manage(env.ingest_config());

    let server_task = tokio::spawn(rocket.launch());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scanner_tasks: Vec<JoinHandle<()>> = endpoints
        .into_iter()
        .map(|(network, endpoint)| {
            spawn_scanner(
                network,
                endpoint,
                pool.clone(),
                env.scanner_config(),
                shutdown_rx.clone(),
            )
        })
        .collect();

    let scheduler = NotificationScheduler::new(
        env.scheduler_config(),
        pool.clone(),
        pusher,
        shutdown_rx,
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, shutting down gracefully...");
        }

        result = server_task => {
            match result {
                Ok(Ok(_)) => info!("Server completed successfully"),
                Ok(Err(e)) => error!("Server failed: {e}"),
                Err(e) => error!("Server task panicked: {e}"),
            }
        }
    }

    if shutdown_tx.send(true).is_err() {
        warn!("All background tasks already stopped");
    }

    for task in scanner_tasks {
        if let Err(e) = task.await {
            error!("Scanner task panicked: {e}");
        }
    }

    if let Err(e) = scheduler_task.await {
        error!("Notification scheduler task panicked: {e}");
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Scans one network, reconnecting with exponential backoff whenever the
/// chain connection is lost.
fn spawn_scanner(
    network: Network,
    endpoint: url::Url,
    pool: SqlitePool,
    config: ScannerConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let span = info_span!("scanner", network = %network);

    tokio::spawn(
        async move {
            let mut stop_rx = shutdown_rx.clone();

            let scan = || {
                let pool = pool.clone();
                let shutdown_rx = shutdown_rx.clone();
                let endpoint = endpoint.clone();

                async move {
                    let rpc = WsChainClient::connect(&endpoint).await?;
                    BlockScanner::new(network, rpc, pool, config, shutdown_rx)
                        .run()
                        .await
                }
            };

            let scanning = scan
                .retry(
                    ExponentialBuilder::default()
                        .with_min_delay(RESTART_MIN_DELAY)
                        .with_max_delay(RESTART_MAX_DELAY)
                        .with_max_times(usize::MAX), // Retry indefinitely
                )
                .notify(|e: &ChainError, delay: Duration| {
                    warn!("Scanner for {network} stopped: {e}, restarting in {delay:?}");
                });

            tokio::select! {
                result = scanning => {
                    if let Err(e) = result {
                        error!("Scanner for {network} gave up: {e}");
                    }
                }
                () = shutdown_requested(&mut stop_rx) => {
                    info!("Scanner for {network} stopped");
                }
            }
        }
        .instrument(span),
    )
}

async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}
