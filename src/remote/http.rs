// src/remote/http.rs
use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;

use super::{ListEntry, Payload, RemoteClient, ResourceKey, ResourceRecord, Scope, Transport};
use crate::error::{Result, SyncError};

/// JSON-over-HTTP remote: `GET {base}/{collection}` lists, `GET {base}/{key}` fetches.
pub struct HttpRemoteClient {
    base_url: String,
    collection: String,
    transport: Transport,
}

impl HttpRemoteClient {
    pub(crate) fn new(base_url: String, collection: String, transport: Transport) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.trim_matches('/').to_string(),
            transport,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json(&self, op: &'static str, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        counter!("sync_remote_calls_total", "op" => op, "transport" => self.transport.label())
            .increment(1);
        let label = request_label(url, query);
        let client = self.transport.client()?;
        let mut req = client.get(url);
        if !query.is_empty() {
            req = req.query(query);
        }
        let resp = req.send().await.map_err(|e| SyncError::transient(&label, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::transient(&label, format!("HTTP {}", status.as_u16())));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| SyncError::transient(&label, format!("decoding body: {e}")))
    }
}

/// The URL as requested, query included, for error targets.
fn request_label(url: &str, query: &[(&str, &str)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{url}?{}", pairs.join("&"))
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn list(&self, scope: &Scope) -> Result<Vec<ListEntry>> {
        let (url, prefix) = match scope {
            Scope::All => (self.url(&self.collection), None),
            Scope::Prefix { bucket, prefix } => (self.url(bucket), Some(prefix.as_str())),
        };
        let query: Vec<(&str, &str)> = prefix.map(|p| ("prefix", p)).into_iter().collect();
        let body = self.get_json("list", &url, &query).await?;

        let page = parse_list_body(body)
            .map_err(|m| SyncError::transient(request_label(&url, &query), m))?;
        if let Some(token) = page.next {
            tracing::debug!(target: "remote", next = %token, "list continuation not followed");
        }
        Ok(page.entries)
    }

    async fn fetch(&self, key: &ResourceKey) -> Result<ResourceRecord> {
        let url = self.url(key.as_str());
        let value = self.get_json("fetch", &url, &[]).await?;
        Ok(ResourceRecord {
            key: key.clone(),
            payload: Payload::Json(value),
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct ListPage {
    pub entries: Vec<ListEntry>,
    pub next: Option<String>,
}

/// Accepts `[...]` or `{"items"|"keys": [...], "next"|"next_token": ...}`.
/// Entries are strings or objects carrying `id`/`key`; objects are kept as
/// the entry's summary.
pub(crate) fn parse_list_body(body: Value) -> std::result::Result<ListPage, String> {
    let (entries, next) = match body {
        Value::Array(items) => (items, None),
        Value::Object(mut map) => {
            let items = map
                .remove("items")
                .or_else(|| map.remove("keys"))
                .ok_or_else(|| "list body has no `items` or `keys`".to_string())?;
            let Value::Array(items) = items else {
                return Err("list `items` is not an array".into());
            };
            let next = map
                .remove("next")
                .or_else(|| map.remove("next_token"))
                .and_then(|v| scalar_to_string(&v));
            (items, next)
        }
        other => return Err(format!("unexpected list body: {other}")),
    };

    let mut listed = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = match &entry {
            Value::Object(obj) => obj
                .get("id")
                .or_else(|| obj.get("key"))
                .and_then(scalar_to_string),
            scalar => scalar_to_string(scalar),
        };
        let Some(key) = key else {
            return Err(format!("list entry without id: {entry}"));
        };
        listed.push(match entry {
            Value::Object(_) => ListEntry::new(key).with_summary(entry),
            _ => ListEntry::new(key),
        });
    }
    Ok(ListPage {
        entries: listed,
        next,
    })
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
