// src/retry.rs
//! Retry policies and the retrying fetcher.
//!
//! The two stock policies keep the fixed 50ms delay with no jitter, so
//! callers that fail together retry together. `Delay::Exponential` is the
//! corrected alternative.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::metrics::ensure_metrics_described;
use crate::remote::{RemoteClient, ResourceKey, ResourceRecord};
use crate::shutdown::{sleep_or_stop, StopSignal};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delay {
    Fixed(Duration),
    /// `min(initial * 2^(attempt-1), max)`, plus up to 25% when `jitter`.
    Exponential {
        initial: Duration,
        max: Duration,
        jitter: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub delay: Delay,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::bounded()
    }
}

impl RetryPolicy {
    /// 8 attempts, fixed 50ms, no jitter.
    pub fn bounded() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            delay: Delay::Fixed(DEFAULT_DELAY),
        }
    }

    /// No cap, fixed 50ms, no jitter, no circuit breaker.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            delay: Delay::Fixed(DEFAULT_DELAY),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delay(mut self, delay: Delay) -> Self {
        self.delay = delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match &self.delay {
            Delay::Fixed(d) => *d,
            Delay::Exponential {
                initial,
                max,
                jitter,
            } => {
                let exp = attempt.saturating_sub(1).min(31);
                let base_ms = (initial.as_millis() as u64).saturating_mul(1u64 << exp);
                let capped_ms = base_ms.min(max.as_millis() as u64);
                let final_ms = if *jitter {
                    let range = capped_ms / 4;
                    capped_ms.saturating_add(rand::rng().random_range(0..=range))
                } else {
                    capped_ms
                };
                Duration::from_millis(final_ms)
            }
        }
    }
}

/// Drive `op` under `policy`. Every failed attempt logs one line with the
/// target, the attempt number and the error, then waits out the delay.
/// Non-transient errors are returned immediately.
pub async fn retry_call<T, F, Fut>(
    policy: &RetryPolicy,
    target: &str,
    stop: Option<&StopSignal>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    ensure_metrics_described();

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        warn!(target: "retry", key = target, attempt, err = %err, "[retry]");
        counter!("sync_retry_attempts_total").increment(1);

        if sleep_or_stop(policy.delay_for(attempt), stop).await {
            return Err(SyncError::Interrupted {
                target: target.to_string(),
                attempts: attempt,
            });
        }

        if let Some(max) = policy.max_attempts {
            if attempt >= max {
                counter!("sync_retries_exhausted_total").increment(1);
                return Err(SyncError::RetriesExhausted {
                    target: target.to_string(),
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }
        }
    }
}

/// Fetches single records through an injected client under a retry policy.
#[derive(Clone)]
pub struct RetryingFetcher {
    client: Arc<dyn RemoteClient>,
    policy: RetryPolicy,
    stop: Option<StopSignal>,
}

impl RetryingFetcher {
    pub fn new(client: Arc<dyn RemoteClient>, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            stop: None,
        }
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch(&self, key: &ResourceKey) -> Result<ResourceRecord> {
        retry_call(&self.policy, key.as_str(), self.stop.as_ref(), || {
            self.client.fetch(key)
        })
        .await
    }
}
