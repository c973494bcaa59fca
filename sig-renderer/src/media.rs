//! Media/widget-HTML resolution and the blob-URL lifecycle analogue.
//!
//! The original renderer hands widgets a `blob:` URL from
//! `createObjectURL`/`revokeObjectURL`; our cache proxy instead serves
//! stable content-addressed paths (`GET /cache/{kind}/{id}`), so there is no
//! browser-managed blob to revoke. `MediaRef` still exists as the owned
//! handle a widget holds, because it is the natural place to keep the
//! per-layout "which media is this layout using" bookkeeping a browser
//! would keep as `layoutBlobUrls` — and because a later platform shell
//! (out of scope here) may back it with a real temporary file needing
//! cleanup, which `Drop` gives us for free.

use async_trait::async_trait;
use sig_types::CacheKind;

/// Content the renderer hands to a widget slot: either a URL-addressable
/// media resource, or an opaque sandboxed HTML blob.
#[derive(Debug, Clone)]
pub enum WidgetContent {
    Media { url: String, media_type: String },
    Html { html: String, media_urls: Vec<String> },
    /// No `fileId`/HTML resolved yet (text-only widget, or resolution
    /// failed and this is a best-effort placeholder).
    None,
}

/// Owned handle to one resolved media resource, scoped to the layout that
/// requested it. Dropping it is the Rust analogue of `revokeObjectURL` —
/// here a no-op beyond logging, since the backing resource is the cache's
/// stable content-addressed file, not a per-handle temporary blob.
#[derive(Debug)]
pub struct MediaRef {
    pub kind: CacheKind,
    pub id: String,
    pub content: WidgetContent,
}

impl Drop for MediaRef {
    fn drop(&mut self) {
        tracing::trace!(kind = ?self.kind, id = %self.id, "media reference released");
    }
}

/// Resolves `fileId`s and widget HTML through the cache, without the
/// renderer depending on `sig-cache` directly — `sig-player` supplies the
/// real implementation backed by `CacheManager::get_file`/`cache_widget_html`.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve_media(&self, kind: CacheKind, id: &str) -> Option<(String, String)>;

    /// Resolves opaque widget HTML (`getResource`). The returned duration,
    /// when present, comes from a `<!-- DURATION=n -->` comment embedded in
    /// the HTML by the CMS and overrides the widget's own XLF-specified
    /// duration per spec's `getResource` contract.
    async fn resolve_widget_html(
        &self,
        layout_id: i64,
        region_id: &str,
        widget_id: &str,
    ) -> Option<(String, Vec<String>, Option<u32>)>;

    /// Marks `layout_id` as a dependant of `(kind, id)` for GC reference
    /// counting.
    async fn add_dependant(&self, kind: CacheKind, id: &str, layout_id: i64);

    /// Releases every dependant reference `layout_id` held, called when a layout leaves the pool.
    async fn remove_layout_dependants(&self, layout_id: i64);

    /// Nudges the download queue so a layout about to become hot isn't
    /// waiting behind unrelated media.
    async fn prioritize(&self, kind: CacheKind, id: &str);
}
