use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: scheduler operations. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "slotwise_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "slotwise_operation_duration_seconds";

/// Counter: bookings/reschedules rejected for overlapping an occupied slot. Labels: stage.
pub const SLOT_CONFLICTS_TOTAL: &str = "slotwise_slot_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for a doctor's lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "slotwise_lock_wait_seconds";

/// Counter: lock acquisitions that hit the timeout.
pub const LOCK_TIMEOUTS_TOTAL: &str = "slotwise_lock_timeouts_total";

/// Gauge: doctors with a loaded calendar.
pub const CALENDARS_ACTIVE: &str = "slotwise_calendars_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotwise_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotwise_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install a fmt subscriber for hosts that have not set one up. Safe to call twice.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}

/// Record one finished operation.
pub(crate) fn record_operation<T, E>(op: &'static str, started: std::time::Instant, result: &Result<T, E>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op).record(started.elapsed().as_secs_f64());
}
