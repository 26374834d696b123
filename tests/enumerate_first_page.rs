// tests/enumerate_first_page.rs
mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{objects, spawn_router};
use remote_sync_worker::config::{RemoteConfig, RemoteKind};
use remote_sync_worker::remote::{self, mock::ScriptedRemote};
use remote_sync_worker::stub_api::{bucket_router, router, BucketState, Dataset, StubState};
use remote_sync_worker::{Enumerator, ResourceKey, Scope};
use serde_json::json;

fn keys(ids: &[&str]) -> Vec<ResourceKey> {
    ids.iter().map(|s| ResourceKey::from(*s)).collect()
}

async fn list_keys(en: &Enumerator) -> Vec<ResourceKey> {
    en.list().await.unwrap().into_iter().map(|e| e.key).collect()
}

#[tokio::test]
async fn scripted_remote_only_first_page_is_seen() {
    let remote = Arc::new(ScriptedRemote::new().with_pages([vec!["1", "2", "3"], vec!["4", "5"]]));
    let en = Enumerator::new(remote.clone(), Scope::All);

    assert_eq!(list_keys(&en).await, keys(&["1", "2", "3"]));
    assert_eq!(remote.list_calls(), 1);
}

#[tokio::test]
async fn empty_listing_is_not_an_error() {
    let en = Enumerator::new(Arc::new(ScriptedRemote::new()), Scope::All);
    assert!(en.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn http_list_ignores_next_token() {
    let state = StubState::new(Dataset::demo()).with_page_size(Some(5));
    let hits = state.hits();
    let base = spawn_router(router(state)).await;

    let client = remote::build_client(&RemoteConfig {
        base_url: base,
        ..Default::default()
    })
    .unwrap();
    let en = Enumerator::new(client, Scope::All);

    assert_eq!(list_keys(&en).await, keys(&["1", "2", "3", "4", "5"]));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn http_listing_keeps_each_order_summary() {
    let base = spawn_router(router(StubState::new(Dataset::demo()))).await;
    let client = remote::build_client(&RemoteConfig {
        base_url: base,
        ..Default::default()
    })
    .unwrap();

    let entries = Enumerator::new(client, Scope::All).list().await.unwrap();
    assert_eq!(entries.len(), 20);
    assert_eq!(entries[5].key, ResourceKey::from("6"));
    assert_eq!(entries[5].field("total"), Some(&json!(1300)));
    assert_eq!(entries[0].field("status"), Some(&json!("pending")));
}

#[tokio::test]
async fn http_list_of_plain_array_returns_everything() {
    let base = spawn_router(router(StubState::new(Dataset::demo()))).await;
    let client = remote::build_client(&RemoteConfig {
        base_url: base,
        collection: "users".into(),
        ..Default::default()
    })
    .unwrap();

    let listed = list_keys(&Enumerator::new(client, Scope::All)).await;
    assert_eq!(listed, keys(&["u1", "u2", "u3", "u4", "u5"]));
}

#[tokio::test]
async fn s3_listing_stops_at_truncated_first_page() {
    let state = BucketState::new(
        "demo-bucket",
        objects(&["logs/a", "logs/b", "logs/c", "logs/d", "tmp/x"]),
    )
    .with_page_size(3);
    let hits = state.hits();
    let base = spawn_router(bucket_router(state)).await;

    let client = remote::build_client(&RemoteConfig {
        kind: RemoteKind::S3,
        base_url: base,
        bucket: Some("demo-bucket".into()),
        ..Default::default()
    })
    .unwrap();
    let en = Enumerator::new(
        client,
        Scope::Prefix {
            bucket: "demo-bucket".into(),
            prefix: "logs/".into(),
        },
    );

    assert_eq!(list_keys(&en).await, keys(&["logs/a", "logs/b", "logs/c"]));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s3_prefix_narrows_listing() {
    let base = spawn_router(bucket_router(BucketState::new(
        "demo-bucket",
        objects(&["logs/a", "tmp/x", "tmp/y"]),
    )))
    .await;
    let client = remote::build_client(&RemoteConfig {
        kind: RemoteKind::S3,
        base_url: base,
        bucket: Some("demo-bucket".into()),
        ..Default::default()
    })
    .unwrap();
    let en = Enumerator::new(
        client,
        Scope::Prefix {
            bucket: "demo-bucket".into(),
            prefix: "tmp/".into(),
        },
    );
    assert_eq!(list_keys(&en).await, keys(&["tmp/x", "tmp/y"]));
}
