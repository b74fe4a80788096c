//! Cache budget and eviction tests.
//!
//! Tests verify:
//! - Materializing past the budget evicts the least recently accessed archive
//! - An archive that is being read is never evicted
//! - A page request pins its archive while it waits for materialization
//! - Purge and clear through the engine

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use folio_streamer::Readiness;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use super::test_utils::{comic_zip, MockArchiveSource, TestHarness};

const URL_A: &str = "https://example.com/a.cbz";
const URL_B: &str = "https://example.com/b.cbz";
const URL_C: &str = "https://example.com/c.cbz";

fn source() -> MockArchiveSource {
    MockArchiveSource::new()
        .with_archive(URL_A, comic_zip(3))
        .with_archive(URL_B, comic_zip(3))
        .with_archive(URL_C, comic_zip(3))
}

/// Bytes one materialized `comic_zip(3)` occupies.
async fn entry_size() -> u64 {
    let harness = TestHarness::new(source(), u64::MAX).await;
    let hash = harness.add(URL_A).await;
    harness.engine.ensure_ready(&hash).await.unwrap();
    harness.engine.store().total_bytes()
}

#[tokio::test]
async fn test_budget_evicts_idle_archive() {
    let size = entry_size().await;
    let harness = TestHarness::new(source(), size + size / 2).await;
    let a = harness.add(URL_A).await;
    let b = harness.add(URL_B).await;

    harness.engine.ensure_ready(&a).await.unwrap();
    harness.engine.ensure_ready(&b).await.unwrap();

    assert!(!harness.engine.is_ready(&a));
    assert!(harness.engine.is_ready(&b));
    assert!(harness.engine.store().total_bytes() <= size + size / 2);
}

#[tokio::test]
async fn test_selected_archive_survives_eviction() {
    let size = entry_size().await;
    let harness = TestHarness::new(source(), size + size / 2).await;
    let a = harness.add(URL_A).await;
    let b = harness.add(URL_B).await;

    harness.engine.ensure_ready(&a).await.unwrap();
    let selection = harness.engine.select(&a);

    harness.engine.ensure_ready(&b).await.unwrap();

    // Over budget, but neither entry may go: A is active, B was just built
    assert!(harness.engine.is_ready(&a));
    assert!(harness.engine.is_ready(&b));
    assert!(harness.engine.store().total_bytes() > size + size / 2);

    // A still serves pages while selected
    harness.engine.read_page(&a, 1).await.unwrap();

    // Once released, the next sweep removes whichever is older
    drop(selection);
    let report = harness.engine.purge_to_budget().await;
    assert_eq!(report.evicted.len(), 1);
    assert!(harness.engine.store().total_bytes() <= size + size / 2);
}

#[tokio::test]
async fn test_recently_read_archive_is_kept() {
    let size = entry_size().await;
    let harness = TestHarness::new(source(), 2 * size + size / 2).await;
    let a = harness.add(URL_A).await;
    let b = harness.add(URL_B).await;
    let c = harness.add(URL_C).await;

    harness.engine.ensure_ready(&a).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    harness.engine.ensure_ready(&b).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    // Reading A makes B the least recently accessed
    harness.engine.read_page(&a, 2).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    harness.engine.ensure_ready(&c).await.unwrap();

    assert!(harness.engine.is_ready(&a));
    assert!(!harness.engine.is_ready(&b));
    assert!(harness.engine.is_ready(&c));
}

#[tokio::test]
async fn test_clear_all_then_refetch() {
    let harness = TestHarness::new(source(), u64::MAX).await;
    let a = harness.add(URL_A).await;

    harness.engine.ensure_ready(&a).await.unwrap();
    harness.engine.clear_all().await.unwrap();

    let stats = harness.engine.stats().await;
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.total_bytes, 0);

    let readiness = harness.engine.ensure_ready(&a).await.unwrap();
    assert_eq!(readiness, Readiness::Ready { total_pages: 3 });
    assert_eq!(harness.source.fetch_count(), 2);
}

#[tokio::test]
async fn test_evicted_archive_is_rebuilt_on_demand() {
    let size = entry_size().await;
    let harness = TestHarness::new(source(), size + size / 2).await;
    let a = harness.add(URL_A).await;
    let b = harness.add(URL_B).await;

    harness.engine.ensure_ready(&a).await.unwrap();
    harness.engine.ensure_ready(&b).await.unwrap();
    assert!(!harness.engine.is_ready(&a));

    harness.engine.ensure_ready(&a).await.unwrap();
    assert!(harness.engine.is_ready(&a));
    assert!(!harness.engine.is_ready(&b));
    assert_eq!(harness.source.fetch_count(), 3);
}

#[tokio::test]
async fn test_pages_request_pins_archive_against_other_runs() {
    let size = entry_size().await;
    let source = source().with_delay(Duration::from_millis(200));
    let harness = TestHarness::new(source, size + size / 2).await;
    let a = harness.add(URL_A).await;
    let b = harness.add(URL_B).await;

    let request = Request::builder()
        .uri(format!("/archives/{a}/pages?limit=10"))
        .body(Body::empty())
        .unwrap();
    let pending = tokio::spawn(harness.router().oneshot(request));

    // The handler holds A from before the readiness check
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.engine.store().is_active(&a));

    // B's sweeps run while A is pinned and cannot take A away
    harness.engine.ensure_ready(&b).await.unwrap();

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_pages"], 3);
    assert_eq!(json["pages"].as_array().unwrap().len(), 3);

    assert!(!harness.engine.store().is_active(&a));
    assert_eq!(harness.source.fetch_count(), 2);
}
