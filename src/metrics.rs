// src/metrics.rs
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

use crate::error::{Result, SyncError};

/// One-time metrics registration (so series show up on the exporter).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "sync_remote_calls_total",
            "Remote list/fetch calls issued, by op and transport."
        );
        describe_counter!(
            "sync_retry_attempts_total",
            "Failed attempts that were logged by the retrying fetcher."
        );
        describe_counter!(
            "sync_retries_exhausted_total",
            "Fetches that gave up after the bounded attempt cap."
        );
        describe_counter!(
            "sync_items_processed_total",
            "Items fetched, filtered in and logged by the batch processor."
        );
        describe_counter!(
            "sync_items_filtered_total",
            "Items dropped by the in-process filter after fetching."
        );
        describe_counter!("sync_cycles_total", "Completed poll cycles.");
        describe_histogram!("sync_cycle_duration_ms", "Poll cycle duration in milliseconds.");
        describe_gauge!("sync_inflight_fetches", "Detail fetches currently in flight.");
    });
}

/// Install the Prometheus recorder with its own HTTP listener on `addr`.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| SyncError::Internal(format!("prometheus exporter on {addr}: {e}")))?;
    ensure_metrics_described();
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}
