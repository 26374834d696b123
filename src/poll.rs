// src/poll.rs
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::shutdown::{sleep_or_stop, StopSignal};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Runs a cycle, sleeps a fixed interval, repeats. A failing cycle ends the
/// loop; nothing is caught and retried at this level.
#[derive(Debug, Clone)]
pub struct PollLoop {
    interval: Duration,
    jitter: Duration,
    max_cycles: Option<u64>,
    stop: Option<StopSignal>,
}

impl Default for PollLoop {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl PollLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            jitter: Duration::ZERO,
            max_cycles: None,
            stop: None,
        }
    }

    /// Adds a uniform random `0..=jitter` to each sleep.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    fn next_sleep(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }
        let extra = rand::rng().random_range(0..=self.jitter.as_millis() as u64);
        self.interval + Duration::from_millis(extra)
    }

    fn stopped(&self) -> bool {
        self.stop.as_ref().is_some_and(|s| s.is_stopped())
    }

    /// Returns the number of completed cycles when stopped or capped.
    /// Any cycle error, `Interrupted` included, comes back as `FatalCycle`;
    /// a stop only ends the loop cleanly before a cycle or during the sleep.
    pub async fn run<F, Fut, T>(&self, mut cycle: F) -> Result<u64>
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut completed: u64 = 0;
        loop {
            if self.stopped() {
                info!(target: "poll", completed, "stop requested before cycle");
                return Ok(completed);
            }

            let n = completed + 1;
            debug!(target: "poll", cycle = n, "cycle start");
            if let Err(e) = cycle(n).await {
                return Err(SyncError::FatalCycle {
                    cycle: n,
                    source: Box::new(e),
                });
            }
            completed = n;

            if self.max_cycles.is_some_and(|max| completed >= max) {
                info!(target: "poll", completed, "cycle cap reached");
                return Ok(completed);
            }

            if sleep_or_stop(self.next_sleep(), self.stop.as_ref()).await {
                info!(target: "poll", completed, "stop requested during interval");
                return Ok(completed);
            }
        }
    }
}
