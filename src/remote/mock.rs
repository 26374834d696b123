// src/remote/mock.rs
//! Scripted in-process remote for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::{ListEntry, Payload, RemoteClient, ResourceKey, ResourceRecord, Scope};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailScript {
    /// Fail the next `n` calls, then behave.
    Times(u32),
    Forever,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub op: &'static str,
    pub target: String,
    pub at: Instant,
}

#[derive(Default)]
pub struct ScriptedRemote {
    pages: Vec<Vec<ResourceKey>>,
    summaries: HashMap<String, Value>,
    records: HashMap<String, Value>,
    fetch_failures: Mutex<HashMap<String, FailScript>>,
    list_failures: Mutex<Option<FailScript>>,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages the remote would hand out; `list` only ever returns the first.
    pub fn with_pages<I, P, K>(mut self, pages: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = K>,
        K: Into<ResourceKey>,
    {
        self.pages = pages
            .into_iter()
            .map(|p| p.into_iter().map(Into::into).collect())
            .collect();
        self
    }

    /// Summary attached to `key` whenever it shows up in a listing.
    pub fn with_summary(mut self, key: impl Into<String>, summary: Value) -> Self {
        self.summaries.insert(key.into(), summary);
        self
    }

    pub fn with_record(mut self, key: impl Into<String>, value: Value) -> Self {
        self.records.insert(key.into(), value);
        self
    }

    pub fn fail_first(self, key: impl Into<String>, n: u32) -> Self {
        self.script(key, FailScript::Times(n))
    }

    pub fn fail_forever(self, key: impl Into<String>) -> Self {
        self.script(key, FailScript::Forever)
    }

    pub fn fail_list(self, script: FailScript) -> Self {
        *self.list_failures.lock().unwrap() = Some(script);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn script(self, key: impl Into<String>, script: FailScript) -> Self {
        self.fetch_failures
            .lock()
            .unwrap()
            .insert(key.into(), script);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == "fetch" && c.target == key)
            .count()
    }

    pub fn list_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == "list")
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record_call(&self, op: &'static str, target: &str) {
        self.calls.lock().unwrap().push(Call {
            op,
            target: target.to_string(),
            at: Instant::now(),
        });
    }

    async fn simulate_latency(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Consumes one failure from `slot` if scripted. Returns true when this call fails.
fn take_failure(slot: Option<&mut FailScript>) -> bool {
    match slot {
        Some(FailScript::Forever) => true,
        Some(FailScript::Times(n)) if *n > 0 => {
            *n -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn list(&self, scope: &Scope) -> Result<Vec<ListEntry>> {
        let target = match scope {
            Scope::All => "*".to_string(),
            Scope::Prefix { bucket, prefix } => format!("{bucket}/{prefix}"),
        };
        self.record_call("list", &target);
        self.simulate_latency().await;

        let fail = take_failure(self.list_failures.lock().unwrap().as_mut());
        if fail {
            return Err(SyncError::transient(target, "429 Too Many Requests"));
        }
        let first = self.pages.first().cloned().unwrap_or_default();
        let prefix = match scope {
            Scope::All => "",
            Scope::Prefix { prefix, .. } => prefix.as_str(),
        };
        Ok(first
            .into_iter()
            .filter(|k| k.as_str().starts_with(prefix))
            .map(|k| match self.summaries.get(k.as_str()) {
                Some(summary) => ListEntry::new(k).with_summary(summary.clone()),
                None => ListEntry::new(k),
            })
            .collect())
    }

    async fn fetch(&self, key: &ResourceKey) -> Result<ResourceRecord> {
        self.record_call("fetch", key.as_str());
        self.simulate_latency().await;

        let fail = take_failure(self.fetch_failures.lock().unwrap().get_mut(key.as_str()));
        if fail {
            return Err(SyncError::transient(key.as_str(), "429 Too Many Requests"));
        }
        match self.records.get(key.as_str()) {
            Some(v) => Ok(ResourceRecord {
                key: key.clone(),
                payload: Payload::Json(v.clone()),
            }),
            None => Err(SyncError::transient(key.as_str(), "HTTP 404")),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
