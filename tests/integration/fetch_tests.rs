//! HTTP archive source tests against a local server.
//!
//! Tests verify:
//! - Successful downloads are written to the destination
//! - Non-success statuses surface as `FetchError::Status`
//! - The archive size limit
//! - A full materialization over HTTP

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;

use folio_streamer::{
    ArchiveSource, CacheLayout, CacheStore, Catalog, Engine, EngineConfig, FetchConfig,
    FetchError, HttpArchiveSource, Locator, Readiness,
};

use super::test_utils::comic_zip;

/// Serve a few fixed archives on an ephemeral port.
async fn spawn_server() -> SocketAddr {
    let archive = comic_zip(3);
    let router = Router::new()
        .route("/books/ok.cbz", get(move || async move { archive }))
        .route(
            "/books/missing.cbz",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        )
        .route(
            "/books/moved.cbz",
            get(|| async { Redirect::temporary("/books/ok.cbz") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn locator(addr: SocketAddr, path: &str) -> Locator {
    Locator::from_url(&format!("http://{addr}{path}")).unwrap()
}

#[tokio::test]
async fn test_download_success() {
    let addr = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("archive.cbz");

    let source = HttpArchiveSource::new(FetchConfig::default()).unwrap();
    let written = source
        .fetch(&locator(addr, "/books/ok.cbz"), &dest)
        .await
        .unwrap();

    assert_eq!(written, comic_zip(3).len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), comic_zip(3));
}

#[tokio::test]
async fn test_download_follows_redirect() {
    let addr = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("archive.cbz");

    let source = HttpArchiveSource::new(FetchConfig::default()).unwrap();
    source
        .fetch(&locator(addr, "/books/moved.cbz"), &dest)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), comic_zip(3));
}

#[tokio::test]
async fn test_download_not_found() {
    let addr = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("archive.cbz");

    let source = HttpArchiveSource::new(FetchConfig::default()).unwrap();
    let err = source
        .fetch(&locator(addr, "/books/missing.cbz"), &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404 }));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_download_too_large() {
    let addr = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("archive.cbz");

    let source = HttpArchiveSource::new(FetchConfig {
        max_bytes: Some(16),
        ..FetchConfig::default()
    })
    .unwrap();
    let err = source
        .fetch(&locator(addr, "/books/ok.cbz"), &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TooLarge { limit: 16, .. }));
}

#[tokio::test]
async fn test_materialize_over_http() {
    let addr = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();

    let catalog = Arc::new(Catalog::new());
    let ok = catalog
        .add(&format!("http://{addr}/books/ok.cbz"))
        .await
        .unwrap();
    let missing = catalog
        .add(&format!("http://{addr}/books/missing.cbz"))
        .await
        .unwrap();

    let source = HttpArchiveSource::new(FetchConfig::default()).unwrap();
    let store = Arc::new(CacheStore::new(CacheLayout::new(dir.path()), u64::MAX));
    let engine = Engine::new(source, catalog, store, EngineConfig::default());

    let readiness = engine.ensure_ready(ok.hash()).await.unwrap();
    assert_eq!(readiness, Readiness::Ready { total_pages: 3 });

    assert!(engine.ensure_ready(missing.hash()).await.is_err());
    assert!(!dir.path().join(missing.hash()).exists());
}
