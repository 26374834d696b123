// src/batch.rs
use std::sync::Arc;

use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use crate::error::{Result, SyncError};
use crate::filter::RecordFilter;
use crate::remote::{ResourceKey, ResourceRecord};
use crate::retry::RetryingFetcher;

pub const ID_PLACEHOLDER: &str = "{id}";

/// One input key and the records of every dependent fetch issued for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedItem {
    pub id: ResourceKey,
    pub details: Vec<ResourceRecord>,
}

impl ProcessedItem {
    /// First match across the JSON details, in fetch order.
    pub fn field(&self, path: &str) -> Option<&serde_json::Value> {
        self.details.iter().find_map(|r| r.field(path))
    }
}

/// What to do with in-flight siblings once one parallel member fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Cancel,
    Drain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// One key after another, dependent fetches in order (N+1).
    Sequential,
    /// One task per key. `max_concurrency: None` puts every key in flight at once.
    Parallel {
        max_concurrency: Option<usize>,
        on_failure: FailurePolicy,
    },
}

impl FanOut {
    pub fn unbounded() -> Self {
        FanOut::Parallel {
            max_concurrency: None,
            on_failure: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchOutcome {
    pub kept: Vec<ProcessedItem>,
    pub filtered_out: usize,
}

pub struct BatchProcessor {
    fetcher: RetryingFetcher,
    fan_out: FanOut,
    detail_paths: Arc<Vec<String>>,
    filter: Option<RecordFilter>,
    log_fields: Vec<String>,
}

impl BatchProcessor {
    pub fn new(fetcher: RetryingFetcher) -> Self {
        Self {
            fetcher,
            fan_out: FanOut::Sequential,
            detail_paths: Arc::new(vec![ID_PLACEHOLDER.to_string()]),
            filter: None,
            log_fields: Vec::new(),
        }
    }

    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Templates such as `profile/{id}`; each key yields one fetch per template.
    pub fn with_detail_paths(mut self, paths: Vec<String>) -> Self {
        self.detail_paths = Arc::new(paths);
        self
    }

    pub fn with_filter(mut self, filter: Option<RecordFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_log_fields(mut self, fields: Vec<String>) -> Self {
        self.log_fields = fields;
        self
    }

    pub async fn process(&self, keys: &[ResourceKey]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        match self.fan_out {
            FanOut::Sequential => {
                for key in keys {
                    let item = fetch_item(&self.fetcher, &self.detail_paths, key).await?;
                    self.accept(item, &mut outcome);
                }
            }
            FanOut::Parallel {
                max_concurrency,
                on_failure,
            } => {
                let items = self.fetch_parallel(keys, max_concurrency, on_failure).await?;
                for item in items {
                    self.accept(item, &mut outcome);
                }
            }
        }
        Ok(outcome)
    }

    async fn fetch_parallel(
        &self,
        keys: &[ResourceKey],
        max_concurrency: Option<usize>,
        on_failure: FailurePolicy,
    ) -> Result<Vec<ProcessedItem>> {
        let permits =
            max_concurrency.map(|n| Arc::new(Semaphore::new(permit_count(n))));
        let mut set = JoinSet::new();

        for (idx, key) in keys.iter().cloned().enumerate() {
            let fetcher = self.fetcher.clone();
            let paths = Arc::clone(&self.detail_paths);
            let permits = permits.clone();
            set.spawn(async move {
                let _permit = match permits {
                    Some(sem) => Some(
                        sem.acquire_owned()
                            .await
                            .map_err(|e| SyncError::Internal(e.to_string()))?,
                    ),
                    None => None,
                };
                let item = fetch_item(&fetcher, &paths, &key).await?;
                Ok::<_, SyncError>((idx, item))
            });
        }

        let mut slots: Vec<Option<ProcessedItem>> = (0..keys.len()).map(|_| None).collect();
        let mut first_err: Option<SyncError> = None;

        while let Some(joined) = set.join_next().await {
            let res = joined
                .map_err(|e| SyncError::Internal(format!("fetch task failed: {e}")))
                .and_then(|r| r);
            match res {
                Ok((idx, item)) => slots[idx] = Some(item),
                Err(e) if first_err.is_none() => match on_failure {
                    FailurePolicy::Cancel => {
                        set.abort_all();
                        return Err(e);
                    }
                    FailurePolicy::Drain => first_err = Some(e),
                },
                Err(e) => {
                    tracing::debug!(target: "batch", error = %e, "additional member failure");
                }
            }
        }

        if let Some(e) = first_err {
            return Err(e);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    fn accept(&self, item: ProcessedItem, outcome: &mut BatchOutcome) {
        if let Some(f) = &self.filter {
            if !f.matches(&item) {
                counter!("sync_items_filtered_total").increment(1);
                outcome.filtered_out += 1;
                return;
            }
        }
        info!(target: "batch", id = %item.id, fields = %self.summarize(&item), "[item]");
        counter!("sync_items_processed_total").increment(1);
        outcome.kept.push(item);
    }

    fn summarize(&self, item: &ProcessedItem) -> String {
        self.log_fields
            .iter()
            .map(|f| match item.field(f) {
                Some(serde_json::Value::String(s)) => format!("{f}={s}"),
                Some(v) => format!("{f}={v}"),
                None => format!("{f}=null"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `max_concurrency` as a semaphore size: at least one, at most what tokio allows.
fn permit_count(n: usize) -> usize {
    n.clamp(1, Semaphore::MAX_PERMITS)
}

/// All dependent fetches for one key, in template order.
async fn fetch_item(
    fetcher: &RetryingFetcher,
    paths: &[String],
    key: &ResourceKey,
) -> Result<ProcessedItem> {
    let mut details = Vec::with_capacity(paths.len());
    for template in paths {
        let target = ResourceKey::from(template.replace(ID_PLACEHOLDER, key.as_str()));
        gauge!("sync_inflight_fetches").increment(1.0);
        let res = fetcher.fetch(&target).await;
        gauge!("sync_inflight_fetches").decrement(1.0);
        details.push(res?);
    }
    Ok(ProcessedItem {
        id: key.clone(),
        details,
    })
}
