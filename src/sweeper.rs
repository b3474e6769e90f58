use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::{self, Engine};

/// Background task that periodically marks late reservations overdue.
/// Exits when `shutdown` flips to `true`.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let pruned = engine.notify.prune();
                if pruned > 0 {
                    debug!("pruned {pruned} idle event channels");
                }
                let today = engine::today();
                match engine.sweep_overdue(today).await {
                    Ok(n) => debug!("sweep {today}: {n} updated"),
                    Err(e) => {
                        // Next tick retries.
                        metrics::counter!(crate::observability::SWEEP_FAILURES_TOTAL).increment(1);
                        warn!("overdue sweep failed (retryable: {}): {e}", e.is_retryable());
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("sweeper stopping");
                    return;
                }
            }
        }
    }
}
