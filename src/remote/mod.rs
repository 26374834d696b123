// src/remote/mod.rs
pub mod http;
pub mod mock;
pub mod s3;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{RemoteConfig, RemoteKind};
use crate::error::Result;

/// Opaque identifier produced by enumeration and consumed by fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What a list call covers: the whole configured collection, or a bucket+prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Prefix { bucket: String, prefix: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    /// Body was never read; only the response head was observed.
    Discarded {
        status: u16,
        content_length: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub key: ResourceKey,
    pub payload: Payload,
}

impl ResourceRecord {
    pub fn json(key: impl Into<ResourceKey>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            payload: Payload::Json(value),
        }
    }

    /// Dotted lookup (`a.b.c`) into a JSON payload.
    pub fn field(&self, path: &str) -> Option<&serde_json::Value> {
        let Payload::Json(value) = &self.payload else {
            return None;
        };
        path.split('.').try_fold(value, |v, seg| v.get(seg))
    }
}

/// One listing row: the key and whatever summary the remote sent with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub key: ResourceKey,
    pub summary: Option<serde_json::Value>,
}

impl ListEntry {
    pub fn new(key: impl Into<ResourceKey>) -> Self {
        Self {
            key: key.into(),
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: serde_json::Value) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Dotted lookup into the summary; `None` when the listing carried none.
    pub fn field(&self, path: &str) -> Option<&serde_json::Value> {
        let summary = self.summary.as_ref()?;
        path.split('.').try_fold(summary, |v, seg| v.get(seg))
    }
}

#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    /// Entries visible under `scope`. One call, first page only.
    async fn list(&self, scope: &Scope) -> Result<Vec<ListEntry>>;
    async fn fetch(&self, key: &ResourceKey) -> Result<ResourceRecord>;
    fn name(&self) -> &'static str;
}

/// How a transport-backed client gets its `reqwest::Client`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// New client per call with idle pooling disabled.
    #[default]
    PerCall,
    /// One client for the lifetime of the remote client.
    Shared,
}

impl TransportMode {
    fn label(self) -> &'static str {
        match self {
            TransportMode::PerCall => "per_call",
            TransportMode::Shared => "shared",
        }
    }
}

/// Holds (or rebuilds) the HTTP transport according to `TransportMode`.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    mode: TransportMode,
    timeout: Option<Duration>,
    shared: Option<reqwest::Client>,
}

impl Transport {
    pub(crate) fn new(mode: TransportMode, timeout: Option<Duration>) -> Result<Self> {
        let shared = match mode {
            TransportMode::Shared => Some(build_reqwest(mode, timeout)?),
            TransportMode::PerCall => None,
        };
        Ok(Self {
            mode,
            timeout,
            shared,
        })
    }

    pub(crate) fn client(&self) -> Result<reqwest::Client> {
        match &self.shared {
            // reqwest::Client is an Arc internally; clone shares the pool
            Some(c) => Ok(c.clone()),
            None => build_reqwest(self.mode, self.timeout),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        self.mode.label()
    }
}

fn build_reqwest(mode: TransportMode, timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("remote-sync-worker/", env!("CARGO_PKG_VERSION")));
    if mode == TransportMode::PerCall {
        builder = builder.pool_max_idle_per_host(0);
    }
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    builder
        .build()
        .map_err(|e| crate::error::SyncError::Internal(format!("building http client: {e}")))
}

/// Single initialization point for the process-wide remote client.
pub fn build_client(cfg: &RemoteConfig) -> Result<Arc<dyn RemoteClient>> {
    let timeout = cfg.request_timeout_ms.map(Duration::from_millis);
    let transport = Transport::new(cfg.transport, timeout)?;
    let client: Arc<dyn RemoteClient> = match cfg.kind {
        RemoteKind::Http => Arc::new(http::HttpRemoteClient::new(
            cfg.base_url.clone(),
            cfg.collection.clone(),
            transport,
        )),
        RemoteKind::S3 => Arc::new(s3::S3StyleClient::new(
            cfg.base_url.clone(),
            cfg.bucket.clone().unwrap_or_default(),
            transport,
        )),
    };
    tracing::info!(
        target: "remote",
        client = client.name(),
        transport = cfg.transport.label(),
        base_url = %cfg.base_url,
        "remote client ready"
    );
    Ok(client)
}
