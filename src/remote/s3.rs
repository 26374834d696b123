// src/remote/s3.rs
use async_trait::async_trait;
use metrics::counter;
use quick_xml::de::from_str;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use super::{ListEntry, Payload, RemoteClient, ResourceKey, ResourceRecord, Scope, Transport};
use crate::error::{Result, SyncError};

#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    contents: Vec<Object>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "NextContinuationToken")]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Object {
    #[serde(rename = "Key")]
    key: Option<String>,
    #[serde(rename = "Size")]
    size: Option<u64>,
}

/// Path-style, unsigned S3 API client (public buckets, MinIO, localstack).
///
/// Listing issues a single ListObjectsV2 without `max-keys` and never follows
/// `NextContinuationToken`. Fetching observes the status line and
/// `Content-Length` and drops the body unread.
pub struct S3StyleClient {
    endpoint: String,
    bucket: String,
    transport: Transport,
}

impl S3StyleClient {
    pub(crate) fn new(endpoint: String, bucket: String, transport: Transport) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket,
            transport,
        }
    }

    /// `{endpoint}/{bucket}/{key...}` with every segment percent-encoded, so
    /// `#`, `?` and `%` inside a key reach the server verbatim.
    fn object_url(&self, bucket: &str, key: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| SyncError::Config(format!("s3 endpoint `{}`: {e}", self.endpoint)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                SyncError::Config(format!("s3 endpoint `{}` cannot take a path", self.endpoint))
            })?;
            segments.pop_if_empty().push(bucket);
            if let Some(key) = key {
                segments.extend(key.split('/'));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl RemoteClient for S3StyleClient {
    async fn list(&self, scope: &Scope) -> Result<Vec<ListEntry>> {
        let (bucket, prefix) = match scope {
            Scope::All => (self.bucket.as_str(), ""),
            Scope::Prefix { bucket, prefix } => (bucket.as_str(), prefix.as_str()),
        };
        let url = self.object_url(bucket, None)?;
        let label = url.to_string();
        counter!("sync_remote_calls_total", "op" => "list", "transport" => self.transport.label())
            .increment(1);

        let resp = self
            .transport
            .client()?
            .get(url)
            .query(&[("list-type", "2"), ("prefix", prefix)])
            .send()
            .await
            .map_err(|e| SyncError::transient(&label, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::transient(&label, format!("HTTP {}", status.as_u16())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SyncError::transient(&label, format!("reading body: {e}")))?;

        let (entries, truncated) =
            parse_list_objects(&body).map_err(|e| SyncError::transient(&label, e))?;
        if truncated {
            tracing::debug!(
                target: "remote",
                bucket,
                prefix,
                "ListObjectsV2 truncated; continuation not followed"
            );
        }
        Ok(entries)
    }

    async fn fetch(&self, key: &ResourceKey) -> Result<ResourceRecord> {
        let url = self.object_url(&self.bucket, Some(key.as_str()))?;
        let label = url.to_string();
        counter!("sync_remote_calls_total", "op" => "fetch", "transport" => self.transport.label())
            .increment(1);

        let resp = self
            .transport
            .client()?
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::transient(&label, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::transient(&label, format!("HTTP {}", status.as_u16())));
        }
        let content_length = resp.content_length();
        drop(resp);

        Ok(ResourceRecord {
            key: key.clone(),
            payload: Payload::Discarded {
                status: status.as_u16(),
                content_length,
            },
        })
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

/// Entries of one ListObjectsV2 page (summary `{"size": n}`) and its truncation flag.
pub(crate) fn parse_list_objects(
    xml: &str,
) -> std::result::Result<(Vec<ListEntry>, bool), String> {
    let parsed: ListBucketResult =
        from_str(xml).map_err(|e| format!("parsing ListBucketResult: {e}"))?;
    let truncated = parsed.is_truncated || parsed.next_continuation_token.is_some();
    let entries = parsed
        .contents
        .into_iter()
        .filter_map(|o| {
            let key = o.key?;
            Some(match o.size {
                Some(size) => ListEntry::new(key).with_summary(json!({ "size": size })),
                None => ListEntry::new(key),
            })
        })
        .collect();
    Ok((entries, truncated))
}
