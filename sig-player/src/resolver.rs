//! Bridges the renderer's [`MediaResolver`] seam to the real
//! [`CacheManager`]/[`CmsClient`], so `sig-renderer` never depends on
//! either directly.

use std::sync::Arc;

use async_trait::async_trait;
use sig_cache::{CacheManager, Resource};
use sig_cms::CmsClient;
use sig_renderer::MediaResolver;
use sig_types::CacheKind;

pub struct CacheResolver {
    cache: Arc<CacheManager>,
    cms: Arc<dyn CmsClient>,
    proxy_base_url: String,
}

impl CacheResolver {
    pub fn new(cache: Arc<CacheManager>, cms: Arc<dyn CmsClient>, proxy_base_url: String) -> Self {
        Self { cache, cms, proxy_base_url }
    }

    fn media_url(&self, kind: CacheKind, id: &str) -> String {
        format!("{}/cache/{}/{}", self.proxy_base_url, kind.wire_code(), id)
    }

    fn widget_url(&self, layout_id: i64, region_id: &str, widget_id: &str) -> String {
        format!("{}/cache/widget/{}/{}/{}", self.proxy_base_url, layout_id, region_id, widget_id)
    }
}

#[async_trait]
impl MediaResolver for CacheResolver {
    async fn resolve_media(&self, kind: CacheKind, id: &str) -> Option<(String, String)> {
        match self.cache.get_file(kind, id).await {
            Ok(Some(Resource::LocalFile { media_type, .. })) => Some((self.media_url(kind, id), media_type)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(?kind, id, error = %e, "media resolve failed");
                None
            }
        }
    }

    /// Fetches and caches widget HTML on first use (`getResource`), then
    /// serves it through the proxy on every subsequent render of the
    /// same widget. `media_urls` is left empty: a real DOM-based consumer
    /// would want the rewritten subresource list, but rendering opaque
    /// widget HTML is explicitly out of scope here — the proxy URL
    /// alone is the contract a future host needs. The duration override
    /// is parsed from the raw HTML's `<!-- DURATION=n -->` comment on
    /// first fetch only; a widget whose content is already cached keeps
    /// whatever duration the layout originally resolved.
    async fn resolve_widget_html(
        &self,
        layout_id: i64,
        region_id: &str,
        widget_id: &str,
    ) -> Option<(String, Vec<String>, Option<u32>)> {
        let cached_path = self.cache.widget_html_path(layout_id, region_id, widget_id);
        let mut duration_override = None;
        if !cached_path.exists() {
            let html = match self.cms.get_resource(layout_id, region_id, widget_id).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(layout_id, region_id, widget_id, error = %e, "getResource failed");
                    return None;
                }
            };
            duration_override = sig_cache::parse_duration_comment(&html);
            if let Err(e) = self.cache.cache_widget_html(layout_id, region_id, widget_id, &html).await {
                tracing::warn!(layout_id, region_id, widget_id, error = %e, "failed to cache widget html");
                return None;
            }
        }
        Some((self.widget_url(layout_id, region_id, widget_id), Vec::new(), duration_override))
    }

    async fn add_dependant(&self, kind: CacheKind, id: &str, layout_id: i64) {
        if let Err(e) = self.cache.add_dependant(kind, id, layout_id).await {
            tracing::warn!(?kind, id, layout_id, error = %e, "failed to record cache dependant");
        }
    }

    async fn remove_layout_dependants(&self, layout_id: i64) {
        if let Err(e) = self.cache.remove_layout_dependants(layout_id).await {
            tracing::warn!(layout_id, error = %e, "failed to release cache dependants");
        }
    }

    async fn prioritize(&self, kind: CacheKind, id: &str) {
        self.cache.prioritize(kind, id).await;
    }
}
