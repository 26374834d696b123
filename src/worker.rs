// src/worker.rs
//! Wires the enumerator and batch processor into one poll cycle.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tracing::info;

use crate::batch::{BatchProcessor, ProcessedItem};
use crate::config::WorkerConfig;
use crate::enumerate::Enumerator;
use crate::error::Result;
use crate::filter::{FilterStage, RecordFilter};
use crate::metrics::ensure_metrics_described;
use crate::poll::PollLoop;
use crate::remote::{RemoteClient, ResourceKey};
use crate::retry::RetryingFetcher;
use crate::shutdown::StopSignal;

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub listed: usize,
    pub kept: Vec<ProcessedItem>,
    pub filtered_out: usize,
    pub elapsed: Duration,
}

pub struct SyncWorker {
    enumerator: Enumerator,
    batch: BatchProcessor,
    listing_filter: Option<RecordFilter>,
}

impl SyncWorker {
    pub fn new(enumerator: Enumerator, batch: BatchProcessor) -> Self {
        Self {
            enumerator,
            batch,
            listing_filter: None,
        }
    }

    /// Drop listed entries whose summary fails `filter` before any detail fetch.
    pub fn with_listing_filter(mut self, filter: Option<RecordFilter>) -> Self {
        self.listing_filter = filter;
        self
    }

    /// Build the whole pipeline around one injected client.
    pub fn from_config(
        cfg: &WorkerConfig,
        client: Arc<dyn RemoteClient>,
        stop: Option<StopSignal>,
    ) -> Result<Self> {
        let policy = cfg.retry.policy();

        let mut fetcher = RetryingFetcher::new(Arc::clone(&client), policy.clone());
        let mut enumerator = Enumerator::new(client, cfg.remote.scope())
            .with_retry(cfg.retry.retry_listing.then_some(policy));
        if let Some(s) = stop {
            fetcher = fetcher.with_stop(s.clone());
            enumerator = enumerator.with_stop(s);
        }

        let filter = cfg.batch.record_filter()?;
        let (listing_filter, detail_filter) = match cfg.batch.filter_stage {
            FilterStage::Listing => (filter, None),
            FilterStage::Detail => (None, filter),
        };

        let batch = BatchProcessor::new(fetcher)
            .with_fan_out(cfg.batch.fan_out())
            .with_detail_paths(cfg.batch.detail_paths.clone())
            .with_filter(detail_filter)
            .with_log_fields(cfg.batch.log_fields.clone());

        Ok(Self::new(enumerator, batch).with_listing_filter(listing_filter))
    }

    /// One Enumerate -> fetch-all -> process pass. Holds no state between calls.
    pub async fn run_cycle(&self, cycle: u64) -> Result<CycleReport> {
        ensure_metrics_described();
        let t0 = tokio::time::Instant::now();

        let entries = self.enumerator.list().await?;
        let listed = entries.len();
        let keys: Vec<ResourceKey> = match &self.listing_filter {
            Some(f) => entries
                .into_iter()
                .filter(|e| f.matches_entry(e))
                .map(|e| e.key)
                .collect(),
            None => entries.into_iter().map(|e| e.key).collect(),
        };
        let skipped = listed - keys.len();
        if skipped > 0 {
            counter!("sync_items_filtered_total").increment(skipped as u64);
        }

        let outcome = self.batch.process(&keys).await?;
        let filtered_out = skipped + outcome.filtered_out;

        let elapsed = t0.elapsed();
        counter!("sync_cycles_total").increment(1);
        histogram!("sync_cycle_duration_ms").record(elapsed.as_secs_f64() * 1_000.0);
        info!(
            target: "poll",
            cycle,
            listed,
            fetched = keys.len(),
            kept = outcome.kept.len(),
            filtered = filtered_out,
            elapsed_ms = elapsed.as_millis() as u64,
            "cycle complete"
        );

        Ok(CycleReport {
            cycle,
            listed,
            kept: outcome.kept,
            filtered_out,
            elapsed,
        })
    }

    /// Drive `run_cycle` under `poll` until it stops, caps out, or a cycle fails.
    pub async fn run(&self, poll: &PollLoop) -> Result<u64> {
        poll.run(|n| self.run_cycle(n)).await
    }
}

/// Poll loop settings from config.
pub fn poll_loop(cfg: &WorkerConfig, stop: Option<StopSignal>) -> PollLoop {
    let mut poll = PollLoop::new(Duration::from_millis(cfg.poll.interval_ms))
        .with_jitter(Duration::from_millis(cfg.poll.jitter_ms))
        .with_max_cycles(cfg.poll.max_cycles);
    if let Some(s) = stop {
        poll = poll.with_stop(s);
    }
    poll
}
