//! Materialization pipeline tests.
//!
//! Tests verify:
//! - Concurrent requests share one download
//! - Page numbers follow container order, not name order
//! - Undecodable entries are skipped without failing the archive
//! - TAR and RAR archives and mislabelled containers
//! - Cache recovery after a restart
//! - Reuse of an archive downloaded before a crash

use std::time::Duration;

use folio_streamer::{ArchiveFormat, EngineError, MaterializeError, Readiness};

use super::test_utils::{
    center_red, comic_zip, is_valid_jpeg, png_bytes, tar_archive, zip_archive,
    MockArchiveSource, TestHarness,
};

const URL: &str = "https://example.com/comics/issue.cbz";

fn assert_red_near(actual: u8, expected: u8) {
    assert!(
        actual.abs_diff(expected) <= 4,
        "expected red ~{expected}, got {actual}"
    );
}

#[tokio::test]
async fn test_concurrent_ensure_ready_fetches_once() {
    let source = MockArchiveSource::new()
        .with_archive(URL, comic_zip(4))
        .with_delay(Duration::from_millis(100));
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = harness.engine.clone();
        let hash = hash.clone();
        handles.push(tokio::spawn(async move { engine.ensure_ready(&hash).await }));
    }

    for handle in handles {
        let readiness = handle.await.unwrap().unwrap();
        assert_eq!(readiness, Readiness::Ready { total_pages: 4 });
    }
    assert_eq!(harness.source.fetch_count(), 1);

    // Ready entries are served from the cache
    harness.engine.ensure_ready(&hash).await.unwrap();
    assert_eq!(harness.source.fetch_count(), 1);
}

#[tokio::test]
async fn test_pages_follow_container_order() {
    // Written out of name order on purpose
    let archive = zip_archive(&[
        ("b.png", png_bytes(8, 8, [200, 0, 0])),
        ("a.png", png_bytes(8, 8, [100, 0, 0])),
        ("c.png", png_bytes(8, 8, [50, 0, 0])),
    ]);
    let source = MockArchiveSource::new().with_archive(URL, archive);
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;

    harness.engine.ensure_ready(&hash).await.unwrap();

    let reds = [200, 100, 50];
    for (i, expected) in reds.into_iter().enumerate() {
        let page = harness
            .engine
            .read_page(&hash, i as i64 + 1)
            .await
            .unwrap();
        assert!(is_valid_jpeg(&page.data));
        assert_red_near(center_red(&page.data), expected);
    }
}

#[tokio::test]
async fn test_corrupt_entry_is_skipped() {
    let archive = zip_archive(&[
        ("001.png", png_bytes(8, 8, [10, 0, 0])),
        ("002.png", b"definitely not a png".to_vec()),
        ("003.png", png_bytes(8, 8, [30, 0, 0])),
        ("notes.txt", b"ignored".to_vec()),
        ("004.png", png_bytes(8, 8, [40, 0, 0])),
    ]);
    let source = MockArchiveSource::new().with_archive(URL, archive);
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;

    let readiness = harness.engine.ensure_ready(&hash).await.unwrap();
    assert_eq!(readiness, Readiness::Ready { total_pages: 3 });

    // Numbering stays contiguous across the skipped entry
    let page = harness.engine.read_page(&hash, 2).await.unwrap();
    assert_red_near(center_red(&page.data), 30);
}

#[tokio::test]
async fn test_tar_archive() {
    let url = "https://example.com/comics/issue.cbt";
    let archive = tar_archive(&[
        ("pages/02.png", png_bytes(8, 8, [120, 0, 0])),
        ("pages/01.png", png_bytes(8, 8, [60, 0, 0])),
    ]);
    let source = MockArchiveSource::new().with_archive(url, archive);
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(url).await;

    let readiness = harness.engine.ensure_ready(&hash).await.unwrap();
    assert_eq!(readiness, Readiness::Ready { total_pages: 2 });

    let page = harness.engine.read_page(&hash, 1).await.unwrap();
    assert_red_near(center_red(&page.data), 120);
}

#[tokio::test]
async fn test_rar_archive() {
    let url = "https://example.com/comics/issue.cbr";
    let fixture = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/comic.cbr");
    let source = MockArchiveSource::new().with_archive(url, std::fs::read(fixture).unwrap());
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(url).await;

    let readiness = harness.engine.ensure_ready(&hash).await.unwrap();
    assert_eq!(readiness, Readiness::Ready { total_pages: 2 });

    // Stored order is pages/b.png, info.txt, pages/a.png
    let first = harness.engine.read_page(&hash, 1).await.unwrap();
    assert!(is_valid_jpeg(&first.data));
    assert_red_near(center_red(&first.data), 200);
    let second = harness.engine.read_page(&hash, 2).await.unwrap();
    assert_red_near(center_red(&second.data), 40);
}

#[tokio::test]
async fn test_mislabelled_container_is_sniffed() {
    // A ZIP served under a .cbr name
    let url = "https://example.com/comics/issue.cbr";
    let source = MockArchiveSource::new().with_archive(url, comic_zip(2));
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(url).await;

    let readiness = harness.engine.ensure_ready(&hash).await.unwrap();
    assert_eq!(readiness, Readiness::Ready { total_pages: 2 });
}

#[tokio::test]
async fn test_large_pages_are_downscaled() {
    let archive = zip_archive(&[("big.png", png_bytes(2400, 1600, [90, 0, 0]))]);
    let source = MockArchiveSource::new().with_archive(URL, archive);
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;

    harness.engine.ensure_ready(&hash).await.unwrap();
    let page = harness.engine.read_page(&hash, 1).await.unwrap();

    let img = image::load_from_memory(&page.data).unwrap();
    assert_eq!((img.width(), img.height()), (1200, 800));
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let archive = zip_archive(&[("readme.txt", b"no images".to_vec())]);
    let source = MockArchiveSource::new().with_archive(URL, archive);
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;

    let err = harness.engine.ensure_ready(&hash).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Materialize(MaterializeError::EmptyArchive)
    ));
    assert!(!harness.engine.is_ready(&hash));

    // A retry runs the pipeline again
    harness.engine.ensure_ready(&hash).await.unwrap_err();
    assert_eq!(harness.source.fetch_count(), 2);

    // Nothing is left behind on disk
    let leftovers = std::fs::read_dir(harness.dir.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_missing_source_is_fetch_failure() {
    let source = MockArchiveSource::new();
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;

    let err = harness.engine.ensure_ready(&hash).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Materialize(MaterializeError::FetchFailed(_))
    ));
}

#[tokio::test]
async fn test_corrupt_container() {
    let source = MockArchiveSource::new().with_archive(URL, b"PK\x03\x04garbage".to_vec());
    let harness = TestHarness::new(source, u64::MAX).await;
    let hash = harness.add(URL).await;

    let err = harness.engine.ensure_ready(&hash).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Materialize(MaterializeError::CorruptArchive(_))
    ));
}

#[tokio::test]
async fn test_recovery_after_restart() {
    let source = MockArchiveSource::new().with_archive(URL, comic_zip(3));
    let harness = TestHarness::new(source.clone(), u64::MAX).await;
    let hash = harness.add(URL).await;
    harness.engine.ensure_ready(&hash).await.unwrap();

    // Restart over the same directory with a fresh source
    let dir = harness.dir;
    let restarted = TestHarness::in_dir(dir, MockArchiveSource::new(), u64::MAX).await;
    restarted.add(URL).await;

    let report = restarted.engine.recover().await.unwrap();
    assert_eq!(report.restored, 1);
    assert!(restarted.engine.is_ready(&hash));

    let readiness = restarted.engine.ensure_ready(&hash).await.unwrap();
    assert_eq!(readiness, Readiness::Ready { total_pages: 3 });
    assert_eq!(restarted.source.fetch_count(), 0);

    let page = restarted.engine.read_page(&hash, 3).await.unwrap();
    assert_red_near(center_red(&page.data), 20);
}

#[tokio::test]
async fn test_recovery_reuses_downloaded_archive() {
    let harness = TestHarness::new(MockArchiveSource::new(), u64::MAX).await;
    let hash = harness.add(URL).await;

    // Crash after the download landed but before pages were published
    let layout = harness.engine.store().layout().clone();
    std::fs::create_dir_all(layout.entry_dir(&hash)).unwrap();
    std::fs::write(layout.archive_path(&hash, ArchiveFormat::Cbz), comic_zip(2)).unwrap();

    let report = harness.engine.recover().await.unwrap();
    assert_eq!(report.restored, 0);
    assert_eq!(report.reusable, 1);
    assert!(layout.archive_path(&hash, ArchiveFormat::Cbz).exists());
    assert!(!harness.engine.is_ready(&hash));

    let readiness = harness.engine.ensure_ready(&hash).await.unwrap();
    assert_eq!(readiness, Readiness::Ready { total_pages: 2 });
    assert_eq!(harness.source.fetch_count(), 0);
}
