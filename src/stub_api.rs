// src/stub_api.rs
//! Local stand-in for the remote APIs the worker talks to: a JSON orders/users
//! service and a path-style S3 bucket, both with injectable 429s.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rand::Rng;
use serde_json::{json, Value};

/// In-memory records served by [`router`].
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub orders: Vec<Value>,
    pub users: Vec<Value>,
    pub profiles: HashMap<String, Value>,
    pub usage: HashMap<String, Value>,
}

impl Dataset {
    /// 20 orders (every third one above 1000) and 5 users.
    pub fn demo() -> Self {
        let orders = (1..=20u32)
            .map(|i| {
                let total = if i % 3 == 0 { 1000 + i * 50 } else { i * 40 };
                let status = if i % 2 == 0 { "paid" } else { "pending" };
                json!({"id": i.to_string(), "total": total, "status": status})
            })
            .collect();

        let mut users = Vec::new();
        let mut profiles = HashMap::new();
        let mut usage = HashMap::new();
        for (i, plan) in ["free", "pro", "pro", "team", "free"].iter().enumerate() {
            let id = format!("u{}", i + 1);
            users.push(json!({"id": id}));
            profiles.insert(id.clone(), json!({"id": id, "plan": plan}));
            usage.insert(id.clone(), json!({"id": id, "bytes": (i as u64 + 1) * 1_048_576}));
        }

        Self {
            orders,
            users,
            profiles,
            usage,
        }
    }

    fn order(&self, id: &str) -> Option<&Value> {
        self.orders
            .iter()
            .find(|o| o.get("id").and_then(Value::as_str) == Some(id))
    }
}

#[derive(Clone)]
pub struct StubState {
    data: Arc<Dataset>,
    failure_rate: f64,
    page_size: Option<usize>,
    hits: Arc<AtomicU64>,
}

impl StubState {
    pub fn new(data: Dataset) -> Self {
        Self {
            data: Arc::new(data),
            failure_rate: 0.0,
            page_size: None,
            hits: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fraction of requests answered with 429 (0.0..=1.0).
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Paginate list responses as `{"items": [...], "next": "<page>"}`.
    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size;
        self
    }

    /// Shared request counter; clone it before handing the state to [`router`].
    pub fn hits(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.hits)
    }

    fn maybe_fail(&self) -> Option<Response> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if self.failure_rate > 0.0 && rand::rng().random_bool(self.failure_rate) {
            return Some((StatusCode::TOO_MANY_REQUESTS, "429 Too Many Requests").into_response());
        }
        None
    }

    fn list_body(&self, items: &[Value], page: usize) -> Value {
        match self.page_size {
            None => Value::Array(items.to_vec()),
            Some(size) => {
                let size = size.max(1);
                let start = page.saturating_mul(size).min(items.len());
                let end = (start + size).min(items.len());
                let next = (end < items.len()).then(|| (page + 1).to_string());
                json!({"items": &items[start..end], "next": next})
            }
        }
    }
}

pub fn router(state: StubState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/orders", get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/users", get(list_users))
        .route("/profile/{id}", get(get_profile))
        .route("/usage/{id}", get(get_usage))
        .with_state(state)
}

fn page_param(q: &HashMap<String, String>) -> usize {
    q.get("page").and_then(|p| p.parse().ok()).unwrap_or(0)
}

async fn list_orders(
    State(s): State<StubState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if let Some(r) = s.maybe_fail() {
        return r;
    }
    Json(s.list_body(&s.data.orders, page_param(&q))).into_response()
}

async fn list_users(
    State(s): State<StubState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if let Some(r) = s.maybe_fail() {
        return r;
    }
    Json(s.list_body(&s.data.users, page_param(&q))).into_response()
}

fn found_or_404(v: Option<&Value>) -> Response {
    match v {
        Some(v) => Json(v.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_order(State(s): State<StubState>, Path(id): Path<String>) -> Response {
    if let Some(r) = s.maybe_fail() {
        return r;
    }
    found_or_404(s.data.order(&id))
}

async fn get_profile(State(s): State<StubState>, Path(id): Path<String>) -> Response {
    if let Some(r) = s.maybe_fail() {
        return r;
    }
    found_or_404(s.data.profiles.get(&id))
}

async fn get_usage(State(s): State<StubState>, Path(id): Path<String>) -> Response {
    if let Some(r) = s.maybe_fail() {
        return r;
    }
    found_or_404(s.data.usage.get(&id))
}

// ---- S3-style bucket ----

#[derive(Clone)]
pub struct BucketState {
    bucket: String,
    objects: Arc<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
    hits: Arc<AtomicU64>,
}

impl BucketState {
    /// ListObjectsV2 pages hold at most 1000 keys, as on S3.
    pub fn new(bucket: impl Into<String>, objects: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(objects),
            page_size: 1000,
            hits: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn hits(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.hits)
    }
}

pub fn bucket_router(state: BucketState) -> Router {
    Router::new()
        .route("/{bucket}", get(list_objects))
        .route("/{bucket}/{*key}", get(get_object))
        .with_state(state)
}

async fn list_objects(
    State(s): State<BucketState>,
    Path(bucket): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    s.hits.fetch_add(1, Ordering::SeqCst);
    if bucket != s.bucket {
        return (StatusCode::NOT_FOUND, "NoSuchBucket").into_response();
    }
    let prefix = q.get("prefix").map(String::as_str).unwrap_or("");
    let matching: Vec<&String> = s
        .objects
        .keys()
        .filter(|k| k.starts_with(prefix))
        .collect();
    let page = &matching[..matching.len().min(s.page_size)];
    let truncated = matching.len() > page.len();

    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult>"#);
    xml.push_str(&format!(
        concat!(
            "<Name>{}</Name><Prefix>{}</Prefix><KeyCount>{}</KeyCount>",
            "<MaxKeys>{}</MaxKeys><IsTruncated>{}</IsTruncated>"
        ),
        xml_escape(&s.bucket),
        xml_escape(prefix),
        page.len(),
        s.page_size,
        truncated
    ));
    for key in page {
        let size = s.objects.get(*key).map(Vec::len).unwrap_or(0);
        xml.push_str(&format!(
            "<Contents><Key>{}</Key><Size>{}</Size></Contents>",
            xml_escape(key),
            size
        ));
    }
    if truncated {
        xml.push_str("<NextContinuationToken>page-2</NextContinuationToken>");
    }
    xml.push_str("</ListBucketResult>");

    ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

async fn get_object(
    State(s): State<BucketState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    s.hits.fetch_add(1, Ordering::SeqCst);
    if bucket != s.bucket {
        return (StatusCode::NOT_FOUND, "NoSuchBucket").into_response();
    }
    match s.objects.get(&key) {
        Some(body) => body.clone().into_response(),
        None => (StatusCode::NOT_FOUND, "NoSuchKey").into_response(),
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
