use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── Engine metrics ──────────────────────────────────────────────

/// Counter: availability checks. Labels: mode (range, current).
pub const AVAILABILITY_CHECKS_TOTAL: &str = "toolrent_availability_checks_total";

/// Histogram: availability computation time in seconds. Labels: mode.
pub const AVAILABILITY_CHECK_DURATION_SECONDS: &str = "toolrent_availability_check_duration_seconds";

/// Counter: administrative transitions. Labels: action, outcome.
pub const TRANSITIONS_TOTAL: &str = "toolrent_transitions_total";

/// Counter: reserved quantity found above stock. Labels: source (check, audit).
pub const OVERCOMMITMENTS_DETECTED_TOTAL: &str = "toolrent_overcommitment_detected_total";

// ── Sweeper metrics ─────────────────────────────────────────────

/// Counter: overdue sweeps started.
pub const SWEEP_RUNS_TOTAL: &str = "toolrent_sweep_runs_total";

/// Counter: reservations moved to overdue.
pub const RESERVATIONS_MARKED_OVERDUE_TOTAL: &str = "toolrent_reservations_marked_overdue_total";

/// Counter: sweeps that failed on a store error.
pub const SWEEP_FAILURES_TOTAL: &str = "toolrent_sweep_failures_total";

/// Install the fmt subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
