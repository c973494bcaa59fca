use sig_cache::{CacheDb, CacheEntry, CacheManager};
use sig_types::{CacheKind, RequiredFile};
use tempfile::TempDir;

fn file(kind: CacheKind, id: &str, md5: &str, size: u64) -> RequiredFile {
    RequiredFile {
        kind,
        id: id.to_string(),
        path: format!("http://cms.example/{id}"),
        md5: md5.to_string(),
        size,
        file_type: Some("video/mp4".to_string()),
        code: None,
    }
}

fn manager() -> (TempDir, CacheManager) {
    let dir = tempfile::tempdir().unwrap();
    let manager = CacheManager::new(dir.path().to_path_buf(), 2).unwrap();
    (dir, manager)
}

#[tokio::test]
async fn reconcile_with_empty_cache_wants_everything_downloaded() {
    let (_dir, cache) = manager();
    let manifest = vec![file(CacheKind::Media, "1", "aaa", 1000)];

    let result = cache.reconcile(&manifest).await.unwrap();
    assert_eq!(result.to_download.len(), 1);
    assert!(result.to_keep.is_empty());
    assert!(result.to_delete.is_empty());
}

#[tokio::test]
async fn reconcile_is_idempotent_once_manifest_is_recorded_unchanged() {
    let (_dir, cache) = manager();
    let manifest = vec![file(CacheKind::Media, "1", "aaa", 1000)];

    cache.reconcile(&manifest).await.unwrap();
    // Nothing was actually downloaded (no cache_entries row), so the file
    // is still wanted on the second pass; the manifest churn itself must
    // not grow to_delete or duplicate to_download entries.
    let second = cache.reconcile(&manifest).await.unwrap();
    assert_eq!(second.to_download.len(), 1);
    assert!(second.to_delete.is_empty());
}

#[tokio::test]
async fn reconcile_drops_cached_entries_no_longer_in_the_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path().to_path_buf(), 2).unwrap();

    // Simulate a previously completed download by writing directly to the
    // same on-disk database the manager opened.
    let db = CacheDb::open(&dir.path().join("cache.db")).unwrap();
    let blob = dir.path().join("orphan.mp4");
    tokio::fs::write(&blob, vec![0u8; 1000]).await.unwrap();
    db.upsert_entry(&CacheEntry {
        kind: CacheKind::Media,
        id: "1".into(),
        media_type: "video/mp4".into(),
        blob_path: blob.clone(),
        size: 1000,
        md5: "aaa".into(),
        last_used: chrono::Utc::now(),
    })
    .unwrap();

    let result = cache.reconcile(&[]).await.unwrap();
    assert_eq!(result.to_delete, vec![(CacheKind::Media, "1".to_string())]);
    assert!(!blob.exists());
}

#[tokio::test]
async fn get_file_on_unknown_entry_reports_cache_miss() {
    let (_dir, cache) = manager();
    let mut events = cache.subscribe();

    let resource = cache.get_file(CacheKind::Media, "missing").await.unwrap();
    assert!(resource.is_none());

    let event = events.try_recv().unwrap();
    match event {
        sig_cache::CacheEvent::CacheMiss { kind, id } => {
            assert_eq!(kind, CacheKind::Media);
            assert_eq!(id, "missing");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn dependant_tracking_survives_add_and_remove() {
    let (_dir, cache) = manager();
    cache.add_dependant(CacheKind::Media, "1", 100).await.unwrap();
    cache.remove_layout_dependants(100).await.unwrap();
    // No assertion on internal state beyond "doesn't error" -- the GC
    // eligibility behavior itself is covered at the db layer.
}

#[tokio::test]
async fn widget_html_round_trips_without_remote_references() {
    let (_dir, cache) = manager();
    let path = cache
        .cache_widget_html(7, "r1", "w1", "<div>static</div>")
        .await
        .unwrap();
    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(contents, "<div>static</div>");
    assert_eq!(cache.widget_html_path(7, "r1", "w1"), path);
}
