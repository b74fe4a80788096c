//! API integration tests for the HTTP surface.
//!
//! Tests verify:
//! - Catalog endpoints (list, add, remove)
//! - Status, pagination and page bytes for a materialized archive
//! - Error cases and their HTTP status codes
//! - Cache administration endpoints

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::test_utils::{comic_zip, is_valid_jpeg, zip_archive, MockArchiveSource, TestHarness};

const URL: &str = "https://example.com/comics/Issue%2001.cbz";

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn harness_with(pages: usize) -> (TestHarness, String) {
    let source = MockArchiveSource::new().with_archive(URL, comic_zip(pages));
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;
    (harness, hash)
}

// =============================================================================
// Health and Catalog
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (harness, _) = harness_with(1).await;
    let (status, body) = get(&harness.router(), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_list_archives() {
    let (harness, hash) = harness_with(2).await;
    let router = harness.router();

    let (status, body) = get(&router, "/archives").await;
    assert_eq!(status, StatusCode::OK);
    let archives = body["archives"].as_array().unwrap();
    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0]["hash"], hash.as_str());
    assert_eq!(archives[0]["title"], "Issue 01");
    assert_eq!(archives[0]["format"], "cbz");
    assert_eq!(archives[0]["cached"], false);

    harness.engine.ensure_ready(&hash).await.unwrap();
    let (_, body) = get(&router, "/archives").await;
    assert_eq!(body["archives"][0]["cached"], true);
}

#[tokio::test]
async fn test_add_archive() {
    let (harness, _) = harness_with(1).await;
    let router = harness.router();

    let (status, body) = post_json(
        &router,
        "/archives",
        json!({"url": "https://example.com/other.cbr", "title": "Other"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Other");
    assert_eq!(body["format"], "cbr");
    assert_eq!(body["hash"].as_str().unwrap().len(), 64);
    assert_eq!(harness.catalog.len().await, 2);
}

#[tokio::test]
async fn test_add_duplicate_archive() {
    let (harness, _) = harness_with(1).await;
    let (status, body) = post_json(&harness.router(), "/archives", json!({"url": URL})).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate");
}

#[tokio::test]
async fn test_add_invalid_archive() {
    let (harness, _) = harness_with(1).await;
    let router = harness.router();

    let (status, body) = post_json(
        &router,
        "/archives",
        json!({"url": "https://example.com/book.pdf"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_locator");

    let (status, _) = post_json(
        &router,
        "/archives",
        json!({"url": "ftp://example.com/a.cbz"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remove_archive() {
    let (harness, hash) = harness_with(2).await;
    let router = harness.router();
    harness.engine.ensure_ready(&hash).await.unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/archives/{hash}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evicted"], true);
    assert!(harness.catalog.is_empty().await);
    assert!(!harness.engine.is_ready(&hash));

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/archives/{hash}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Status and Pages
// =============================================================================

#[tokio::test]
async fn test_status_ready() {
    let (harness, hash) = harness_with(3).await;
    let (status, body) = get(&harness.router(), &format!("/archives/{hash}/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ready", "total_pages": 3}));
}

#[tokio::test]
async fn test_status_processing() {
    let source = MockArchiveSource::new()
        .with_archive(URL, comic_zip(1))
        .with_delay(std::time::Duration::from_millis(300));
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;
    let router = harness.router();

    let (status, body) = get(&router, &format!("/archives/{hash}/status?wait_ms=0")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "processing");

    let (status, _) = get(&router, &format!("/archives/{hash}/status?wait_ms=10000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(harness.source.fetch_count(), 1);
}

#[tokio::test]
async fn test_pagination() {
    let (harness, hash) = harness_with(8).await;
    let router = harness.router();

    let (status, body) = get(&router, &format!("/archives/{hash}/pages")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_pages"], 8);
    assert_eq!(body["current_offset"], 0);
    let pages = body["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 5);
    assert_eq!(pages[0]["page"], 1);
    assert_eq!(pages[0]["url"], format!("/archives/{hash}/pages/1"));
    assert!(pages[0]["size"].as_u64().unwrap() > 0);

    let (_, body) = get(&router, &format!("/archives/{hash}/pages?offset=5&limit=5")).await;
    let pages = body["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0]["page"], 6);
    assert_eq!(pages[2]["page"], 8);
    assert_eq!(body["current_offset"], 5);

    let (status, body) = get(&router, &format!("/archives/{hash}/pages?offset=8")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["pages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_pagination_limit_is_clamped() {
    let (harness, hash) = harness_with(3).await;
    let router = harness.router();

    let (_, body) = get(&router, &format!("/archives/{hash}/pages?limit=0")).await;
    assert_eq!(body["pages"].as_array().unwrap().len(), 1);

    let (_, body) = get(&router, &format!("/archives/{hash}/pages?limit=1000")).await;
    assert_eq!(body["pages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_negative_offset() {
    let (harness, hash) = harness_with(3).await;
    let (status, body) = get(
        &harness.router(),
        &format!("/archives/{hash}/pages?offset=-1"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_offset");
    assert_eq!(harness.source.fetch_count(), 0);
}

#[tokio::test]
async fn test_page_bytes() {
    let (harness, hash) = harness_with(2).await;
    let router = harness.router();

    let request = Request::builder()
        .uri(format!("/archives/{hash}/pages/2"))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/jpeg");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );
    assert_eq!(response.headers().get("x-page-cache-hit").unwrap(), "false");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_valid_jpeg(&body));

    // Second read is served from memory
    let request = Request::builder()
        .uri(format!("/archives/{hash}/pages/2.jpg"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("x-page-cache-hit").unwrap(), "true");
}

#[tokio::test]
async fn test_page_out_of_range() {
    let (harness, hash) = harness_with(2).await;
    let router = harness.router();

    let (status, body) = get(&router, &format!("/archives/{hash}/pages/0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "page_not_found");

    let (status, _) = get(&router, &format!("/archives/{hash}/pages/3")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&router, &format!("/archives/{hash}/pages/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

// =============================================================================
// Error Mapping
// =============================================================================

#[tokio::test]
async fn test_unknown_archive() {
    let (harness, _) = harness_with(1).await;
    let unknown = "0".repeat(64);
    let (status, body) = get(&harness.router(), &format!("/archives/{unknown}/status")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_fetch_failure() {
    let harness = TestHarness::new(MockArchiveSource::new(), u64::MAX).await;
    let hash = harness.add(URL).await;
    let (status, body) = get(&harness.router(), &format!("/archives/{hash}/pages")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "fetch_failed");
}

#[tokio::test]
async fn test_empty_archive() {
    let archive = zip_archive(&[("info.txt", b"text only".to_vec())]);
    let source = MockArchiveSource::new().with_archive(URL, archive);
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;
    let (status, body) = get(&harness.router(), &format!("/archives/{hash}/status")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "empty_archive");
}

// =============================================================================
// Cache Administration
// =============================================================================

#[tokio::test]
async fn test_cache_stats_and_clear() {
    let (harness, hash) = harness_with(2).await;
    let router = harness.router();
    harness.engine.ensure_ready(&hash).await.unwrap();

    let (status, body) = get(&router, "/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], 1);
    assert!(body["total_bytes"].as_u64().unwrap() > 0);
    assert_eq!(body["in_flight"], 0);

    let (status, body) = post_json(&router, "/cache/clear", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cleared");

    let (_, body) = get(&router, "/cache").await;
    assert_eq!(body["entries"], 0);
    assert_eq!(body["total_bytes"], 0);
}

#[tokio::test]
async fn test_cache_purge_within_budget() {
    let (harness, hash) = harness_with(2).await;
    harness.engine.ensure_ready(&hash).await.unwrap();

    let (status, body) = post_json(&harness.router(), "/cache/purge", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["evicted"].as_array().unwrap().is_empty());
    assert_eq!(body["freed_bytes"], 0);
    assert!(harness.engine.is_ready(&hash));
}
