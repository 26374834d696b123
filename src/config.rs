// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::{FailurePolicy, FanOut, ID_PLACEHOLDER};
use crate::error::SyncError;
use crate::filter::{FilterStage, RecordFilter};
use crate::remote::{Scope, TransportMode};
use crate::retry::{Delay, RetryPolicy};

pub const ENV_CONFIG_PATH: &str = "SYNC_WORKER_CONFIG";
pub const ENV_PRESET: &str = "SYNC_PRESET";
pub const ENV_BASE_URL: &str = "SYNC_REMOTE_BASE_URL";
pub const ENV_INTERVAL_MS: &str = "SYNC_POLL_INTERVAL_MS";

/// Named starting points mirroring the classic fixture workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// List orders, fetch each (bounded retry), keep `total > 1000`.
    Orders,
    /// List users, fetch profile + usage per user (bounded retry).
    Users,
    /// Orders with unbounded retry on both list and detail.
    OrdersUnbounded,
    /// One S3 listing, every object fetched at once, bodies discarded.
    S3Sweep,
}

impl std::str::FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::String(s.trim().to_ascii_lowercase()))
            .map_err(|_| anyhow!("unknown preset `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKind {
    #[default]
    Http,
    S3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub kind: RemoteKind,
    pub base_url: String,
    /// Path listed for `Scope::All` on the HTTP remote.
    pub collection: String,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub transport: TransportMode,
    pub request_timeout_ms: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            kind: RemoteKind::Http,
            base_url: "http://127.0.0.1:8089".to_string(),
            collection: "orders".to_string(),
            bucket: None,
            prefix: None,
            transport: TransportMode::PerCall,
            request_timeout_ms: None,
        }
    }
}

impl RemoteConfig {
    pub fn scope(&self) -> Scope {
        match (self.kind, &self.bucket, &self.prefix) {
            (RemoteKind::S3, _, None) => Scope::All,
            (_, Some(bucket), prefix) => Scope::Prefix {
                bucket: bucket.clone(),
                prefix: prefix.clone().unwrap_or_default(),
            },
            (_, None, _) => Scope::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Bounded,
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub policy: PolicyKind,
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff: BackoffKind,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub retry_listing: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Bounded,
            max_attempts: crate::retry::DEFAULT_MAX_ATTEMPTS,
            delay_ms: crate::retry::DEFAULT_DELAY.as_millis() as u64,
            backoff: BackoffKind::Fixed,
            max_delay_ms: 10_000,
            jitter: false,
            retry_listing: false,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let max_attempts = match self.policy {
            PolicyKind::Bounded => Some(self.max_attempts),
            PolicyKind::Unbounded => None,
        };
        let delay = match self.backoff {
            BackoffKind::Fixed => Delay::Fixed(Duration::from_millis(self.delay_ms)),
            BackoffKind::Exponential => Delay::Exponential {
                initial: Duration::from_millis(self.delay_ms),
                max: Duration::from_millis(self.max_delay_ms),
                jitter: self.jitter,
            },
        };
        RetryPolicy {
            max_attempts,
            delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub mode: BatchMode,
    /// 0 = no ceiling.
    pub max_concurrency: usize,
    pub on_failure: FailurePolicy,
    pub detail_paths: Vec<String>,
    pub filter: Option<String>,
    /// `listing` tests list summaries before fetching; `detail` fetches first.
    pub filter_stage: FilterStage,
    pub log_fields: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: BatchMode::Sequential,
            max_concurrency: 0,
            on_failure: FailurePolicy::Cancel,
            detail_paths: vec![format!("orders/{ID_PLACEHOLDER}")],
            filter: None,
            filter_stage: FilterStage::Listing,
            log_fields: Vec::new(),
        }
    }
}

impl BatchConfig {
    pub fn fan_out(&self) -> FanOut {
        match self.mode {
            BatchMode::Sequential => FanOut::Sequential,
            BatchMode::Parallel => FanOut::Parallel {
                max_concurrency: (self.max_concurrency > 0).then_some(self.max_concurrency),
                on_failure: self.on_failure,
            },
        }
    }

    pub fn record_filter(&self) -> crate::error::Result<Option<RecordFilter>> {
        self.filter
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(|f| f.parse::<RecordFilter>())
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub jitter_ms: u64,
    pub max_cycles: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: crate::poll::DEFAULT_INTERVAL.as_millis() as u64,
            jitter_ms: 0,
            max_cycles: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
}

impl TelemetryConfig {
    pub fn metrics_socket(&self) -> crate::error::Result<Option<SocketAddr>> {
        self.metrics_addr
            .as_deref()
            .map(|a| {
                a.parse::<SocketAddr>()
                    .map_err(|e| SyncError::Config(format!("metrics_addr `{a}`: {e}")))
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub preset: Option<Preset>,
    pub remote: RemoteConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub poll: PollConfig,
    pub telemetry: TelemetryConfig,
}

impl WorkerConfig {
    pub fn from_preset(preset: Preset) -> Self {
        let mut cfg = WorkerConfig {
            preset: Some(preset),
            ..Default::default()
        };
        match preset {
            Preset::Orders => {
                cfg.batch.filter = Some("total > 1000".into());
                cfg.batch.filter_stage = FilterStage::Listing;
                cfg.batch.log_fields = vec!["status".into(), "total".into()];
            }
            Preset::Users => {
                cfg.remote.collection = "users".into();
                cfg.batch.detail_paths = vec!["profile/{id}".into(), "usage/{id}".into()];
                cfg.batch.log_fields = vec!["plan".into(), "bytes".into()];
            }
            Preset::OrdersUnbounded => {
                cfg.retry.policy = PolicyKind::Unbounded;
                cfg.retry.retry_listing = true;
                cfg.batch.filter = Some("total > 1000".into());
                cfg.batch.filter_stage = FilterStage::Listing;
                cfg.batch.log_fields = vec!["status".into(), "total".into()];
            }
            Preset::S3Sweep => {
                cfg.remote.kind = RemoteKind::S3;
                cfg.remote.base_url = "http://127.0.0.1:9000".into();
                cfg.remote.bucket = Some("demo-bucket".into());
                cfg.remote.prefix = Some(String::new());
                cfg.retry.max_attempts = 1;
                cfg.batch.mode = BatchMode::Parallel;
                cfg.batch.detail_paths = vec![ID_PLACEHOLDER.into()];
                cfg.poll.max_cycles = Some(1);
            }
        }
        cfg
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.retry.policy == PolicyKind::Bounded && self.retry.max_attempts == 0 {
            return Err(SyncError::Config("retry.max_attempts must be >= 1".into()));
        }
        if self.batch.detail_paths.is_empty() {
            return Err(SyncError::Config("batch.detail_paths is empty".into()));
        }
        if let Some(p) = self
            .batch
            .detail_paths
            .iter()
            .find(|p| !p.contains(ID_PLACEHOLDER))
        {
            return Err(SyncError::Config(format!(
                "detail path `{p}` lacks {ID_PLACEHOLDER}"
            )));
        }
        if self.remote.kind == RemoteKind::S3
            && self.remote.bucket.as_deref().unwrap_or("").is_empty()
        {
            return Err(SyncError::Config("s3 remote requires remote.bucket".into()));
        }
        if self.remote.kind == RemoteKind::Http
            && self.remote.prefix.is_some()
            && self.remote.bucket.is_none()
        {
            return Err(SyncError::Config(
                "remote.prefix needs remote.bucket on the http remote".into(),
            ));
        }
        self.batch.record_filter()?;
        self.telemetry.metrics_socket()?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            if !url.trim().is_empty() {
                self.remote.base_url = url.trim().to_string();
            }
        }
        if let Ok(ms) = std::env::var(ENV_INTERVAL_MS) {
            self.poll.interval_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("{ENV_INTERVAL_MS}=`{ms}` is not a number"))?;
        }
        Ok(())
    }
}

/// Load from an explicit path. Supports TOML or JSON formats.
pub fn load_from(path: &Path) -> Result<WorkerConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading worker config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut cfg = parse_config(&content, ext.as_str())?;
    cfg.apply_env_overrides()?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load using env var + fallbacks:
/// 1) $SYNC_WORKER_CONFIG
/// 2) config/worker.toml
/// 3) config/worker.json
/// 4) built-in defaults (or $SYNC_PRESET)
pub fn load_default() -> Result<WorkerConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/worker.toml");
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    let json_p = PathBuf::from("config/worker.json");
    if json_p.exists() {
        return load_from(&json_p);
    }
    let mut cfg = resolve(Value::Object(Default::default()))?;
    cfg.apply_env_overrides()?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn parse_config(s: &str, hint_ext: &str) -> Result<WorkerConfig> {
    let raw = if hint_ext == "json" {
        serde_json::from_str::<Value>(s).context("parsing worker config as JSON")?
    } else {
        match toml::from_str::<Value>(s) {
            Ok(v) => v,
            Err(toml_err) => serde_json::from_str::<Value>(s)
                .map_err(|_| anyhow!("unsupported worker config format: {toml_err}"))?,
        }
    };
    resolve(raw)
}

/// Preset first (env wins over file), then the file's explicit keys on top.
fn resolve(raw: Value) -> Result<WorkerConfig> {
    let preset = match std::env::var(ENV_PRESET) {
        Ok(p) if !p.trim().is_empty() => Some(p.parse::<Preset>()?),
        _ => match raw.get("preset") {
            Some(Value::Null) | None => None,
            Some(v) => Some(
                serde_json::from_value::<Preset>(v.clone())
                    .map_err(|_| anyhow!("unknown preset {v}"))?,
            ),
        },
    };

    let base = preset.map(WorkerConfig::from_preset).unwrap_or_default();
    let mut merged = serde_json::to_value(&base).context("serializing base config")?;
    merge(&mut merged, raw);
    let mut cfg: WorkerConfig =
        serde_json::from_value(merged).context("worker config has invalid fields")?;
    cfg.preset = preset;
    Ok(cfg)
}

fn merge(base: &mut Value, over: Value) {
    match (base, over) {
        (Value::Object(b), Value::Object(o)) => {
            for (k, v) in o {
                match b.get_mut(&k) {
                    Some(slot) => merge(slot, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn defaults_reproduce_the_classic_worker() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.retry.policy(), RetryPolicy::bounded());
        assert_eq!(cfg.poll.interval_ms, 1000);
        assert_eq!(cfg.batch.fan_out(), FanOut::Sequential);
        assert_eq!(cfg.remote.transport, TransportMode::PerCall);
        assert_eq!(cfg.remote.scope(), Scope::All);
        assert!(cfg.validate().is_ok());
    }

    #[serial_test::serial]
    #[test]
    fn preset_then_explicit_keys() {
        env::remove_var(ENV_PRESET);
        let toml = r#"
preset = "users"

[retry]
policy = "unbounded"

[batch]
mode = "parallel"
max_concurrency = 4
"#;
        let cfg = parse_config(toml, "toml").unwrap();
        assert_eq!(cfg.preset, Some(Preset::Users));
        assert_eq!(cfg.remote.collection, "users");
        assert_eq!(cfg.batch.detail_paths, vec!["profile/{id}", "usage/{id}"]);
        assert_eq!(cfg.retry.policy().max_attempts, None);
        assert_eq!(
            cfg.batch.fan_out(),
            FanOut::Parallel {
                max_concurrency: Some(4),
                on_failure: FailurePolicy::Cancel
            }
        );
    }

    #[serial_test::serial]
    #[test]
    fn env_preset_wins_over_file() {
        env::set_var(ENV_PRESET, "s3-sweep");
        let cfg = parse_config(r#"{"preset": "orders"}"#, "json").unwrap();
        env::remove_var(ENV_PRESET);
        assert_eq!(cfg.preset, Some(Preset::S3Sweep));
        assert_eq!(cfg.remote.kind, RemoteKind::S3);
        assert_eq!(cfg.batch.fan_out(), FanOut::unbounded());
        assert_eq!(
            cfg.remote.scope(),
            Scope::Prefix {
                bucket: "demo-bucket".into(),
                prefix: String::new()
            }
        );
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut cfg = WorkerConfig::default();
        cfg.batch.detail_paths = vec!["orders".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = WorkerConfig::default();
        cfg.batch.filter = Some("total ~ 3".into());
        assert!(cfg.validate().is_err());

        let mut cfg = WorkerConfig::default();
        cfg.remote.kind = RemoteKind::S3;
        assert!(cfg.validate().is_err());

        let mut cfg = WorkerConfig::default();
        cfg.remote.prefix = Some("2024/".into());
        assert!(cfg.validate().is_err());
        cfg.remote.bucket = Some("orders".into());
        assert!(cfg.validate().is_ok());

        let mut cfg = WorkerConfig::default();
        cfg.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());
        cfg.retry.policy = PolicyKind::Unbounded;
        assert!(cfg.validate().is_ok());
    }

    #[serial_test::serial]
    #[test]
    fn orders_preset_filters_listing_unless_told_otherwise() {
        env::remove_var(ENV_PRESET);
        let cfg = parse_config(r#"preset = "orders""#, "toml").unwrap();
        assert_eq!(cfg.batch.filter_stage, FilterStage::Listing);

        let toml = r#"
preset = "orders"

[batch]
filter_stage = "detail"
"#;
        let cfg = parse_config(toml, "toml").unwrap();
        assert_eq!(cfg.batch.filter.as_deref(), Some("total > 1000"));
        assert_eq!(cfg.batch.filter_stage, FilterStage::Detail);
    }

    #[test]
    fn exponential_backoff_section() {
        let retry = RetryConfig {
            backoff: BackoffKind::Exponential,
            delay_ms: 100,
            max_delay_ms: 400,
            ..Default::default()
        };
        assert_eq!(
            retry.policy().delay,
            Delay::Exponential {
                initial: Duration::from_millis(100),
                max: Duration::from_millis(400),
                jitter: false
            }
        );
    }

    #[test]
    fn merge_is_deep() {
        let mut base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 1});
        merge(&mut base, serde_json::json!({"a": {"y": 3}, "c": true}));
        assert_eq!(base, serde_json::json!({"a": {"x": 1, "y": 3}, "b": 1, "c": true}));
    }
}
