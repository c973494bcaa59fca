//! CacheManager: reconciles the RequiredFiles manifest against local
//! storage, drives the download queue, and serves media through
//! content-addressed paths.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sig_types::{CacheKind, RequiredFile};
use tokio::sync::{broadcast, Mutex, Semaphore};

use crate::db::{CacheDb, CacheEntry};
use crate::download::{default_chunk_count, Downloader};
use crate::error::{Error, Result};
use crate::widget_html::cache_widget_html as rewrite_widget_html;

/// Minimum plausible size of a real media/layout payload. Responses
/// smaller than this, or served as `text/plain`, are the CMS's error-page
/// heuristic.
const MIN_VALID_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Queued,
    Active,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub enum CacheEvent {
    MediaCached { kind: CacheKind, id: String },
    CacheMiss { kind: CacheKind, id: String },
    Fault { context: String, message: String },
}

/// Result of reconciling a manifest against local storage.
#[derive(Debug, Default)]
pub struct ReconcileResult {
    pub to_download: Vec<RequiredFile>,
    pub to_delete: Vec<(CacheKind, String)>,
    pub to_keep: Vec<(CacheKind, String)>,
}

/// The URL-level resource handed to the renderer for a cached file.
#[derive(Debug, Clone)]
pub enum Resource {
    /// Path on disk the in-process HTTP proxy (see [`crate::proxy`]) will
    /// serve, honoring Range requests.
    LocalFile { path: PathBuf, media_type: String },
}

struct QueueEntry {
    file: RequiredFile,
    status: DownloadStatus,
}

pub struct CacheManager {
    db: Arc<CacheDb>,
    blob_dir: PathBuf,
    widget_dir: PathBuf,
    queue: Arc<Mutex<VecDeque<QueueEntry>>>,
    concurrency: Arc<Semaphore>,
    events: broadcast::Sender<CacheEvent>,
    http: reqwest::Client,
    cms_base_url: Mutex<Option<String>>,
}

impl CacheManager {
    pub fn new(data_dir: PathBuf, download_concurrency: usize) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let blob_dir = data_dir.join("blobs");
        let widget_dir = data_dir.join("widgets");
        std::fs::create_dir_all(&blob_dir)?;
        std::fs::create_dir_all(&widget_dir)?;

        let db = Arc::new(CacheDb::open(&data_dir.join("cache.db"))?);
        Ok(Self {
            db,
            blob_dir,
            widget_dir,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            concurrency: Arc::new(Semaphore::new(download_concurrency.max(1))),
            events: broadcast::channel(256).0,
            http: reqwest::Client::new(),
            cms_base_url: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub async fn set_cms_base_url(&self, url: String) {
        *self.cms_base_url.lock().await = Some(url);
    }

    /// Idempotent: a second call with the same manifest yields empty
    /// `to_download`/`to_delete`.
    pub async fn reconcile(&self, manifest: &[RequiredFile]) -> Result<ReconcileResult> {
        let mut result = ReconcileResult::default();
        let mut wanted = std::collections::HashSet::new();

        for file in manifest {
            wanted.insert((file.kind, file.id.clone()));
            match self.db.get_entry(file.kind, &file.id)? {
                Some(entry) if entry.md5 == file.md5 && entry.size == file.size => {
                    result.to_keep.push((file.kind, file.id.clone()));
                }
                _ => result.to_download.push(file.clone()),
            }
        }

        for entry in self.db.all_entries()? {
            let key = (entry.kind, entry.id.clone());
            if !wanted.contains(&key) && !self.db.has_dependants(entry.kind, &entry.id)? {
                result.to_delete.push(key);
            }
        }

        for (kind, id) in &result.to_delete {
            self.evict_entry(*kind, id).await?;
        }

        self.db.set_manifest(manifest)?;
        Ok(result)
    }

    async fn evict_entry(&self, kind: CacheKind, id: &str) -> Result<()> {
        if let Some(entry) = self.db.get_entry(kind, id)? {
            let _ = tokio::fs::remove_file(&entry.blob_path).await;
        }
        self.db.delete_entry(kind, id)
    }

    /// LRU-like eviction of unreferenced entries, triggered when a write
    /// hits a quota-exceeded error. Not a background sweep — only runs in
    /// response to an actual write failure.
    async fn gc_unreferenced(db: &CacheDb, count: usize) -> Result<usize> {
        let candidates = db.unreferenced_entries_lru(count)?;
        let evicted = candidates.len();
        for entry in candidates {
            let _ = tokio::fs::remove_file(&entry.blob_path).await;
            db.delete_entry(entry.kind, &entry.id)?;
        }
        Ok(evicted)
    }

    /// Applies the "cached error page" integrity heuristic on read,
    /// deleting and reporting `missing` on detection.
    pub async fn get_file(&self, kind: CacheKind, id: &str) -> Result<Option<Resource>> {
        let Some(entry) = self.db.get_entry(kind, id)? else {
            let _ = self.events.send(CacheEvent::CacheMiss {
                kind,
                id: id.to_string(),
            });
            return Ok(None);
        };

        if entry.media_type == "text/plain" || entry.size < MIN_VALID_SIZE {
            tracing::warn!(?kind, id, "cached entry looks like an error page, evicting");
            self.evict_entry(kind, id).await?;
            let _ = self.events.send(CacheEvent::CacheMiss {
                kind,
                id: id.to_string(),
            });
            return Ok(None);
        }

        if !entry.blob_path.exists() {
            self.db.delete_entry(kind, id)?;
            let _ = self.events.send(CacheEvent::CacheMiss {
                kind,
                id: id.to_string(),
            });
            return Ok(None);
        }

        self.db.touch_entry(kind, id)?;
        Ok(Some(Resource::LocalFile {
            path: entry.blob_path,
            media_type: entry.media_type,
        }))
    }

    /// Enqueues `entries` (layouts before media, media ascending by size),
    /// then waits until at least one has transitioned `queued` -> `active`
    /// before acknowledging, guarding against silent boot-time drops.
    pub async fn request_download(&self, entries: Vec<RequiredFile>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        {
            let mut ordered = entries;
            ordered.sort_by_key(|f| match f.kind {
                CacheKind::Layout => (0u8, 0u64),
                CacheKind::Resource => (1, f.size),
                CacheKind::Media => (2, f.size),
            });

            let mut queue = self.queue.lock().await;
            for file in ordered {
                queue.push_back(QueueEntry {
                    file,
                    status: DownloadStatus::Queued,
                });
            }
        }

        self.drain_queue();
        self.wait_for_activity().await
    }

    async fn wait_for_activity(&self) -> Result<()> {
        for _ in 0..100 {
            {
                let queue = self.queue.lock().await;
                if queue.is_empty()
                    || queue
                        .iter()
                        .any(|e| e.status == DownloadStatus::Active || e.status == DownloadStatus::Done)
                {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Err(Error::Other(anyhow::anyhow!(
            "download request not acknowledged: no task became active"
        )))
    }

    /// Moves the entry to the queue front; promotes it to active
    /// immediately if still queued. No-op if already active.
    pub async fn prioritize(&self, kind: CacheKind, id: &str) {
        let mut queue = self.queue.lock().await;
        if let Some(pos) = queue.iter().position(|e| e.file.kind == kind && e.file.id == id) {
            if queue[pos].status == DownloadStatus::Active {
                return;
            }
            let entry = queue.remove(pos).unwrap();
            queue.push_front(entry);
        }
        drop(queue);
        self.drain_queue();
    }

    pub async fn add_dependant(&self, kind: CacheKind, id: &str, layout_id: i64) -> Result<()> {
        self.db.add_dependant(kind, id, layout_id)
    }

    pub async fn remove_layout_dependants(&self, layout_id: i64) -> Result<()> {
        self.db.remove_layout_dependants(layout_id)
    }

    /// Launches as many queued downloads as the concurrency permit allows.
    /// Each spawned task mutates the shared queue/db only through the
    /// `Mutex`/`CacheDb` it was handed; ordering among files is not
    /// otherwise guaranteed.
    fn drain_queue(&self) {
        let available = self.concurrency.available_permits();
        if available == 0 {
            return;
        }

        for _ in 0..available {
            let db = self.db.clone();
            let blob_dir = self.blob_dir.clone();
            let http = self.http.clone();
            let events = self.events.clone();
            let permit = self.concurrency.clone();
            let queue = self.queue.clone();
            tokio::spawn(async move {
                let Some(file) = Self::pop_next_queued(&queue).await else {
                    return;
                };
                let Ok(permit) = permit.try_acquire_owned() else {
                    return;
                };
                Self::run_download(db, blob_dir, http, events, queue, file, permit).await;
            });
        }
    }

    async fn pop_next_queued(queue: &Arc<Mutex<VecDeque<QueueEntry>>>) -> Option<RequiredFile> {
        let mut q = queue.lock().await;
        let pos = q.iter().position(|e| e.status == DownloadStatus::Queued)?;
        q[pos].status = DownloadStatus::Active;
        Some(q[pos].file.clone())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_download(
        db: Arc<CacheDb>,
        blob_dir: PathBuf,
        http: reqwest::Client,
        events: broadcast::Sender<CacheEvent>,
        queue: Arc<Mutex<VecDeque<QueueEntry>>>,
        file: RequiredFile,
        _permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let dest = blob_dir.join(format!("{}_{}", file.kind.wire_code(), file.id));
        let url = file.path.clone();
        let downloader = Downloader::new(1);

        let mut outcome = downloader
            .download_verified(&url, &dest, file.size, &file.md5, default_chunk_count())
            .await;

        if is_quota_exceeded(&outcome) {
            tracing::warn!(kind = ?file.kind, id = %file.id, "write failed on quota-exceeded, running LRU eviction and retrying once");
            if let Err(e) = Self::gc_unreferenced(&db, 16).await {
                tracing::error!(error = %e, "LRU eviction pass failed");
            }
            outcome = downloader
                .download_verified(&url, &dest, file.size, &file.md5, default_chunk_count())
                .await;
        }

        let mut q = queue.lock().await;
        if let Some(pos) = q.iter().position(|e| e.file.kind == file.kind && e.file.id == file.id) {
            match &outcome {
                Ok(()) => q[pos].status = DownloadStatus::Done,
                Err(_) => q[pos].status = DownloadStatus::Failed,
            }
        }
        drop(q);

        match outcome {
            Ok(()) => {
                let media_type = sniff_media_type(&file, &dest).await;
                let entry = CacheEntry {
                    kind: file.kind,
                    id: file.id.clone(),
                    media_type,
                    blob_path: dest,
                    size: file.size,
                    md5: file.md5.clone(),
                    last_used: Utc::now(),
                };
                if let Err(e) = db.upsert_entry(&entry) {
                    tracing::error!(error = %e, "failed to persist cache entry");
                }
                let _ = events.send(CacheEvent::MediaCached {
                    kind: file.kind,
                    id: file.id.clone(),
                });
            }
            Err(e) => {
                tracing::error!(kind = ?file.kind, id = %file.id, error = %e, "download failed permanently");
                let _ = events.send(CacheEvent::Fault {
                    context: format!("{:?}/{}", file.kind, file.id),
                    message: e.to_string(),
                });
            }
        }

        let _ = http; // reserved for future auth/header reuse across downloads
    }

    /// Stores opaque widget HTML, rewriting inline CSS `url(...)`
    /// references and static script tags to local proxy paths, fetching
    /// and caching the referenced subresources.
    pub async fn cache_widget_html(
        &self,
        layout_id: i64,
        region_id: &str,
        widget_id: &str,
        html: &str,
    ) -> Result<PathBuf> {
        let rewritten = rewrite_widget_html(&self.http, &self.widget_dir, html).await?;
        let path = self
            .widget_dir
            .join(format!("{layout_id}_{region_id}_{widget_id}.html"));
        tokio::fs::write(&path, rewritten).await?;
        Ok(path)
    }

    pub fn widget_html_path(&self, layout_id: i64, region_id: &str, widget_id: &str) -> PathBuf {
        self.widget_dir
            .join(format!("{layout_id}_{region_id}_{widget_id}.html"))
    }
}

/// Detects the "disk full" / quota-exceeded case (`ENOSPC` on Unix) inside
/// a download outcome, as distinct from ordinary network/integrity errors.
fn is_quota_exceeded(outcome: &Result<()>) -> bool {
    matches!(outcome, Err(Error::Io(e)) if e.raw_os_error() == Some(28))
}

async fn sniff_media_type(file: &RequiredFile, path: &PathBuf) -> String {
    if let Some(ft) = &file.file_type {
        return ft.clone();
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") | Some("m4v") => "video/mp4".to_string(),
        Some("png") => "image/png".to_string(),
        Some("jpg") | Some("jpeg") => "image/jpeg".to_string(),
        Some("mp3") => "audio/mpeg".to_string(),
        Some("xlf") | Some("xml") => "application/xml".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
