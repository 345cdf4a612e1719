//! Integration tests for the consistency bridge against a stub remote store.
//!
//! The stub is a small axum app on an ephemeral port that keeps PATCHed
//! documents in memory and can be switched into a failing mode.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tagstore::config::RemoteSection;
use tagstore::remote::{BridgeState, ConsistencyBridge, MirrorOutcome, RetryPolicy};
use tagstore::service::TagService;
use tagstore_core::{FlagKind, ImageItem, OffensiveLog, RecordStore, TagSet, UserIdentity};

// =============================================================================
// STUB REMOTE
// =============================================================================

#[derive(Clone, Default)]
struct Stub {
    documents: Arc<Mutex<Map<String, Value>>>,
    failing: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

async fn patch_document(
    State(stub): State<Stub>,
    Path((collection, file)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if stub.failing.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    assert_eq!(collection, "image_tags");
    let key = file.trim_end_matches(".json").to_string();
    let mut docs = stub.documents.lock().unwrap();
    let entry = docs
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if let (Value::Object(existing), Value::Object(fields)) = (entry, &body) {
        for (k, v) in fields {
            existing.insert(k.clone(), v.clone());
        }
    }
    Ok(Json(body))
}

async fn read_collection(State(stub): State<Stub>) -> Result<Json<Value>, StatusCode> {
    stub.reads.fetch_add(1, Ordering::SeqCst);
    if stub.failing.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    let docs = stub.documents.lock().unwrap();
    if docs.is_empty() {
        return Ok(Json(Value::Null));
    }
    Ok(Json(Value::Object(docs.clone())))
}

/// Start the stub and return its base URL.
async fn start_stub(stub: Stub) -> String {
    let app = Router::new()
        .route("/image_tags.json", get(read_collection))
        .route("/{collection}/{file}", patch(patch_document))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn settings(url: &str) -> RemoteSection {
    RemoteSection {
        database_url: Some(url.to_string()),
        timeout_secs: 2,
        ..RemoteSection::default()
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_attempts: 3,
    }
}

fn service_with(bridge: ConsistencyBridge, dir: &std::path::Path) -> TagService {
    TagService::new(
        RecordStore::new(),
        bridge,
        OffensiveLog::in_dir(dir),
        1,
        Duration::from_secs(30),
    )
}

fn user(uid: &str) -> UserIdentity {
    UserIdentity {
        email: format!("{uid}@example.com"),
        uid: Some(uid.to_string()),
        display_name: None,
    }
}

// =============================================================================
// MIRRORING
// =============================================================================

#[tokio::test]
async fn save_is_mirrored_under_sanitized_key() {
    let stub = Stub::default();
    let url = start_stub(stub.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(ConsistencyBridge::from_settings(&settings(&url)), dir.path());

    let item = ImageItem {
        id: Some("cat.photo/1".to_string()),
        ..ImageItem::new("http://img/cat.png", "a cat")
    };
    let outcome = service.save(&user("u1"), &item, TagSet::new()).await.unwrap();

    assert_eq!(outcome.flush.unwrap().mirrored, 1);
    let docs = stub.documents.lock().unwrap();
    let doc = docs.get("cat_photo_1").unwrap();
    assert_eq!(doc["image_id"], "cat.photo/1");
    assert_eq!(doc["uid"], "u1");
    drop(docs);
    assert_eq!(service.bridge().state(), BridgeState::Ready);
}

#[tokio::test]
async fn flag_is_mirrored_with_flag_set() {
    let stub = Stub::default();
    let url = start_stub(stub.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(ConsistencyBridge::from_settings(&settings(&url)), dir.path());

    let item = ImageItem {
        id: Some("img-3".to_string()),
        ..ImageItem::new("", "")
    };
    let outcome = service
        .flag(&user("u1"), &item, FlagKind::Rejected)
        .await
        .unwrap();

    assert_eq!(outcome.mirror, MirrorOutcome::Mirrored);
    let docs = stub.documents.lock().unwrap();
    assert_eq!(docs["img-3"]["rejected"], true);
    assert_eq!(docs["img-3"]["flagged"], false);
}

// =============================================================================
// DEGRADED / RECOVERY
// =============================================================================

#[tokio::test]
async fn unreachable_remote_degrades_without_blocking_local_write() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = ConsistencyBridge::from_settings(&settings("http://127.0.0.1:1"))
        .with_read_policy(fast_retry());
    let service = service_with(bridge, dir.path());

    let item = ImageItem::new("http://img/one.png", "one");
    let outcome = service.save(&user("u1"), &item, TagSet::new()).await.unwrap();

    let flush = outcome.flush.unwrap();
    assert_eq!(flush.written, 1);
    assert_eq!(flush.mirrored, 0);
    assert_eq!(service.bridge().state(), BridgeState::Degraded);

    let counts = service.counts(Some("u1")).await.unwrap();
    assert_eq!(counts.local_total, 1);
    assert_eq!(counts.local_user, Some(1));
    assert_eq!(counts.remote_total, 0);
    assert_eq!(counts.remote_user, Some(0));
}

#[tokio::test]
async fn bridge_recovers_after_remote_comes_back() {
    let stub = Stub::default();
    let url = start_stub(stub.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(ConsistencyBridge::from_settings(&settings(&url)), dir.path());

    stub.failing.store(true, Ordering::SeqCst);
    let first = service
        .save(&user("u1"), &ImageItem::new("http://img/a.png", ""), TagSet::new())
        .await
        .unwrap();
    assert_eq!(first.flush.unwrap().mirrored, 0);
    assert_eq!(service.bridge().state(), BridgeState::Degraded);

    stub.failing.store(false, Ordering::SeqCst);
    let second = service
        .save(&user("u1"), &ImageItem::new("http://img/b.png", ""), TagSet::new())
        .await
        .unwrap();
    assert_eq!(second.flush.unwrap().mirrored, 1);
    assert_eq!(service.bridge().state(), BridgeState::Ready);

    // The missed write is repaired by an explicit reconcile.
    let report = service.reconcile().await.unwrap();
    assert_eq!(report.mirrored, 2);
    assert!(stub.documents.lock().unwrap().contains_key("a_png"));
}

// =============================================================================
// REMOTE COUNTS
// =============================================================================

#[tokio::test]
async fn remote_counts_distinct_documents() {
    let stub = Stub::default();
    let url = start_stub(stub.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(ConsistencyBridge::from_settings(&settings(&url)), dir.path());

    assert_eq!(service.bridge().count_remote_total().await, 0);

    for (uid, image) in [("u1", "a"), ("u1", "b"), ("u2", "c"), ("u1", "a")] {
        let item = ImageItem {
            id: Some(image.to_string()),
            ..ImageItem::new("", "")
        };
        service.save(&user(uid), &item, TagSet::new()).await.unwrap();
    }

    let counts = service.counts(Some("u1")).await.unwrap();
    assert_eq!(counts.remote_total, 3);
    assert_eq!(counts.remote_user, Some(2));
    assert_eq!(counts.local_total, 3);
}

#[tokio::test]
async fn failed_reads_are_retried_then_fall_back_to_zero() {
    let stub = Stub::default();
    let url = start_stub(stub.clone()).await;
    stub.failing.store(true, Ordering::SeqCst);

    let bridge = ConsistencyBridge::from_settings(&settings(&url)).with_read_policy(fast_retry());
    assert_eq!(bridge.count_remote_total().await, 0);
    assert_eq!(stub.reads.load(Ordering::SeqCst), 3);
    assert_eq!(bridge.state(), BridgeState::Degraded);
}
