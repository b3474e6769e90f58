use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use toolrent::config::Config;
use toolrent::engine::Engine;
use toolrent::notify::NotifyHub;
use toolrent::store::SqliteStore;
use toolrent::{observability, sweeper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    observability::init_tracing(&config.log_filter);
    observability::init_metrics(config.metrics_port)?;

    let store = SqliteStore::connect(
        &config.database_url,
        config.max_connections,
        config.acquire_timeout,
    )
    .await?;
    let engine = Arc::new(Engine::new(Arc::new(store), Arc::new(NotifyHub::new())));

    info!("toolrent started");
    info!("  database: {}", config.database_url);
    info!("  sweep interval: {}s", config.sweep_interval.as_secs());
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(sweeper::run_sweeper(
        engine.clone(),
        config.sweep_interval,
        shutdown_rx,
    ));

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    sweeper.await?;

    info!("toolrent stopped");
    Ok(())
}
