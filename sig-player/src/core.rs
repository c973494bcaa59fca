//! `PlayerCore`: the collection-cycle orchestrator. Exactly one Tokio task
//! owns the `Renderer`/`Scheduler` state, driven by a `tokio::select!` loop
//! over the collection timer, the XMR transport and the renderer's own
//! tick/event channels — a single-writer-task plus broadcast event fan-out,
//! the same shape as any actor that owns its state and publishes events
//! rather than being called into concurrently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sig_cache::{CacheEvent, CacheManager};
use sig_cms::{CmsClient, XmrCommand, XmrMessage, XmrTransport};
use sig_renderer::{MediaResolver, Renderer, RendererEvent};
use sig_scheduler::Scheduler;
use sig_types::{ActionType, Layout};
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::faults::FaultLog;
use crate::stats::StatsCollector;

pub struct PlayerCoreConfig {
    pub collection_interval: Duration,
    pub stats_flush_interval: Duration,
}

impl Default for PlayerCoreConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(900),
            stats_flush_interval: Duration::from_secs(60),
        }
    }
}

pub struct PlayerCore {
    cms: Arc<dyn CmsClient>,
    cache: Arc<CacheManager>,
    scheduler: Arc<Scheduler>,
    renderer: Renderer,
    xmr: Option<Box<dyn XmrTransport>>,
    stats: StatsCollector,
    faults: FaultLog,
    config: PlayerCoreConfig,

    renderer_events: broadcast::Receiver<RendererEvent>,
    cache_events: broadcast::Receiver<CacheEvent>,

    /// CRC32 tokens from the last `registerDisplay` call, so an unchanged
    /// manifest/schedule skips its fetch.
    last_check_rf: Option<String>,
    last_check_schedule: Option<String>,

    /// Remembered winner from `Scheduler::select` when it differs from the
    /// currently hot layout; applied at the next cycle boundary, never
    /// preempting the layout in progress.
    pending_layout: Option<i64>,
    active_overlays: Vec<i64>,

    /// Guards against a double `layoutStart` if a collection cycle's
    /// pending-layout application overlaps an XMR `changeLayout`.
    switching: bool,
}

impl PlayerCore {
    pub fn new(
        cms: Arc<dyn CmsClient>,
        cache: Arc<CacheManager>,
        scheduler: Arc<Scheduler>,
        resolver: Arc<dyn MediaResolver>,
        xmr: Option<Box<dyn XmrTransport>>,
        config: PlayerCoreConfig,
    ) -> Self {
        let renderer = Renderer::new(resolver);
        let renderer_events = renderer.subscribe();
        let cache_events = cache.subscribe();
        Self {
            cms,
            cache,
            scheduler,
            renderer,
            xmr,
            stats: StatsCollector::new(),
            faults: FaultLog::new(),
            config,
            renderer_events,
            cache_events,
            last_check_rf: None,
            last_check_schedule: None,
            pending_layout: None,
            active_overlays: Vec::new(),
            switching: false,
        }
    }

    /// Runs the orchestrator until Ctrl+C.
    pub async fn run(mut self) -> Result<()> {
        if let Err(e) = self.collect_once().await {
            tracing::error!(error = %e, "initial collection cycle failed");
        }

        let mut collection_ticker = tokio::time::interval(self.config.collection_interval);
        collection_ticker.tick().await; // first tick fires immediately; already collected above
        let mut flush_ticker = tokio::time::interval(self.config.stats_flush_interval);
        flush_ticker.tick().await;

        loop {
            tokio::select! {
                _ = collection_ticker.tick() => {
                    if let Err(e) = self.collect_once().await {
                        self.faults.report("collect-error", &e.to_string(), "collection-cycle", Utc::now(), None, None, None);
                    }
                }
                _ = flush_ticker.tick() => {
                    self.flush_stats_and_faults().await;
                }
                event = self.renderer_events.recv() => {
                    match event {
                        Ok(ev) => self.handle_renderer_event(ev).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "renderer event receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                event = self.cache_events.recv() => {
                    match event {
                        Ok(ev) => self.handle_cache_event(ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "cache event receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {}
                    }
                }
                () = self.renderer.poll_tick() => {}
                cmd = next_xmr(&mut self.xmr) => {
                    if let Some(msg) = cmd {
                        self.handle_xmr(msg).await;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
            }
        }

        self.flush_stats_and_faults().await;
        Ok(())
    }

    // ---- Collection cycle ---------------------------------------

    async fn collect_once(&mut self) -> Result<()> {
        let register = self.cms.register_display().await?;

        if Some(&register.check_rf) != self.last_check_rf.as_ref() {
            let manifest = self.cms.required_files().await?;
            let reconcile = self.cache.reconcile(&manifest).await?;
            if !reconcile.to_download.is_empty() {
                if let Err(e) = self.cache.request_download(reconcile.to_download).await {
                    self.faults.report(
                        "cache-miss",
                        &e.to_string(),
                        "request-download",
                        Utc::now(),
                        None,
                        None,
                        None,
                    );
                }
            }
            self.last_check_rf = Some(register.check_rf.clone());
        }

        if Some(&register.check_schedule) != self.last_check_schedule.as_ref() {
            let schedule = self.cms.schedule().await?;
            self.scheduler
                .set_schedule(schedule.events, schedule.campaigns, schedule.default_layout_id)?;
            self.last_check_schedule = Some(register.check_schedule.clone());
        }

        self.reselect().await;
        Ok(())
    }

    /// Re-runs `Scheduler::select` and either cold-starts the first layout
    /// or remembers a pending swap for the next cycle boundary.
    async fn reselect(&mut self) {
        let now = Utc::now();
        let current = self.renderer.hot_layout_id();
        let selection = self.scheduler.select(now, current);
        self.active_overlays = selection.overlays;

        match current {
            None => {
                if let Some(layout_id) = selection.foreground {
                    if let Err(e) = self.render_layout_id(layout_id).await {
                        self.faults.report(
                            "layoutError",
                            &e.to_string(),
                            &format!("layout/{layout_id}"),
                            now,
                            Some(layout_id),
                            None,
                            None,
                        );
                    }
                } else {
                    self.faults.report("no-content", "no layout available", "scheduler", now, None, None, None);
                }
            }
            Some(_) => {
                if let Some(pending) = selection.pending_layout {
                    self.pending_layout = Some(pending);
                }
            }
        }
    }

    // ---- Layout switching ------------------------------------------------

    async fn load_layout(&self, layout_id: i64) -> Result<Layout> {
        let resource = self
            .cache
            .get_file(sig_types::CacheKind::Layout, &layout_id.to_string())
            .await?
            .ok_or_else(|| Error::Other(anyhow::anyhow!("layout {layout_id} not cached")))?;
        let sig_cache::Resource::LocalFile { path, .. } = resource;
        let xml = tokio::fs::read_to_string(&path).await.map_err(|e| Error::Other(e.into()))?;
        let mut layout = sig_types::xlf::parse_layout(&xml)?;
        layout.layout_id = layout_id;
        Ok(layout)
    }

    async fn render_layout_id(&mut self, layout_id: i64) -> Result<()> {
        if self.switching {
            return Ok(());
        }
        self.switching = true;
        let loaded = self.load_layout(layout_id).await;
        let result = match loaded {
            Ok(layout) => self.renderer.render(&layout).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        self.switching = false;
        result
    }

    /// XMR `changeLayout` / `navLayout` action: immediate, bypassing the
    /// next-cycle-boundary rule.
    async fn change_layout(&mut self, layout_id: i64) {
        if let Err(e) = self.render_layout_id(layout_id).await {
            self.faults.report(
                "layoutError",
                &e.to_string(),
                &format!("layout/{layout_id}"),
                Utc::now(),
                Some(layout_id),
                None,
                None,
            );
        } else {
            self.pending_layout = None;
        }
    }

    // ---- Renderer event routing -------------------

    async fn handle_renderer_event(&mut self, event: RendererEvent) {
        match event {
            RendererEvent::LayoutStart { layout_id } => {
                self.stats.begin_layout(layout_id, Utc::now());
            }
            RendererEvent::LayoutEnd { layout_id } => {
                let now = Utc::now();
                let duration = self.stats.end_layout(layout_id, now);
                self.scheduler.record_play(layout_id, duration, now);

                let next = match self.pending_layout.take() {
                    Some(pending) => Some(pending),
                    None => {
                        let selection = self.scheduler.select(now, Some(layout_id));
                        self.active_overlays = selection.overlays;
                        // `pending_layout` carries a genuinely different winner;
                        // `foreground` carries the same id back when nothing
                        // changed, which `Renderer::render` treats as a replay.
                        selection.pending_layout.or(selection.foreground)
                    }
                };

                match next {
                    Some(next_id) => {
                        if let Err(e) = self.render_layout_id(next_id).await {
                            self.faults.report(
                                "layoutError",
                                &e.to_string(),
                                &format!("layout/{next_id}"),
                                now,
                                Some(next_id),
                                None,
                                None,
                            );
                        }
                    }
                    None => {
                        self.faults.report("no-content", "no layout available", "scheduler", now, None, None, None);
                    }
                }
            }
            RendererEvent::WidgetStart { widget_id, layout_id, enable_stat, .. } => {
                if enable_stat {
                    self.stats.begin_widget(&widget_id, layout_id, Utc::now());
                }
            }
            RendererEvent::WidgetEnd { widget_id, .. } => {
                self.stats.end_widget(&widget_id, Utc::now());
            }
            RendererEvent::ActionTrigger { action, .. } => {
                self.dispatch_action(action, None).await;
            }
            RendererEvent::WidgetAction { action, region_id, .. } => {
                self.dispatch_action(action, Some(region_id)).await;
            }
            RendererEvent::WidgetCommand { widget_id, command_code, .. } => {
                tracing::info!(widget_id, command_code, "widget command fired (shell execution is external)");
            }
            RendererEvent::Fault { context, message } => {
                self.faults.report("layoutError", &message, &context, Utc::now(), None, None, None);
            }
            RendererEvent::MediaCached { kind, id } => {
                tracing::debug!(?kind, id, "renderer notified of cached media");
            }
            RendererEvent::RequestNextLayoutPreload { current_layout_id } => {
                self.handle_preload_request(current_layout_id).await;
            }
            RendererEvent::Paused { layout_id } => tracing::info!(layout_id, "playback paused"),
            RendererEvent::Resumed { layout_id } => tracing::info!(layout_id, "playback resumed"),
        }
    }

    async fn dispatch_action(&mut self, action: sig_types::Action, region_id: Option<String>) {
        match action.action_type {
            ActionType::NavLayout => {
                if let Some(target) = action.target_id.as_deref().and_then(|s| s.parse::<i64>().ok()) {
                    self.change_layout(target).await;
                }
            }
            ActionType::NavWidget => {
                if let Some(target) = action.target_id.as_deref() {
                    if let Err(e) = self.renderer.navigate_to_widget(target).await {
                        self.faults.report("layoutError", &e.to_string(), "navWidget", Utc::now(), None, None, None);
                    }
                }
            }
            ActionType::Next | ActionType::Previous => {
                let delta = if matches!(action.action_type, ActionType::Next) { 1 } else { -1 };
                let Some(region_id) = region_id else {
                    self.faults.report(
                        "layoutError",
                        "next/previous action fired without a resolvable region",
                        "action-trigger",
                        Utc::now(),
                        None,
                        None,
                        None,
                    );
                    return;
                };
                if let Err(e) = self.renderer.advance(&region_id, delta).await {
                    self.faults.report("layoutError", &e.to_string(), "next/previous", Utc::now(), None, Some(region_id), None);
                }
            }
            ActionType::Command => {
                tracing::info!(target = ?action.target_id, "command action triggered (webhook dispatch is external)");
            }
        }
    }

    /// `PlayerCore`'s response to `request-next-layout-preload`: peek the scheduler, fetch/parse the XLF from
    /// cache (never blocking on a network round-trip — if it isn't cached
    /// yet the hint is simply skipped and retried at the 90% mark), and
    /// hand it to `Renderer::preload_layout`. Idempotent: the pool itself
    /// no-ops if already warm for that id.
    async fn handle_preload_request(&mut self, current_layout_id: i64) {
        let now = Utc::now();
        let selection = self.scheduler.select(now, Some(current_layout_id));
        let Some(next_id) = selection.pending_layout.or(selection.foreground).filter(|id| *id != current_layout_id) else {
            return;
        };
        match self.load_layout(next_id).await {
            Ok(layout) => self.renderer.preload_layout(&layout).await,
            Err(e) => {
                tracing::debug!(layout_id = next_id, error = %e, "preload skipped, not cached yet");
            }
        }
    }

    fn handle_cache_event(&mut self, event: CacheEvent) {
        match event {
            CacheEvent::MediaCached { kind, id } => tracing::debug!(?kind, id, "media cached"),
            CacheEvent::CacheMiss { kind, id } => {
                self.faults.report("cache-miss", "requested file missing from cache", &format!("{kind:?}/{id}"), Utc::now(), None, None, None);
            }
            CacheEvent::Fault { context, message } => {
                self.faults.report("collect-error", &message, &context, Utc::now(), None, None, None);
            }
        }
    }

    // ---- XMR command routing --------------

    async fn handle_xmr(&mut self, msg: XmrMessage) {
        let now = Utc::now();
        if msg.is_expired(now) {
            tracing::debug!(?msg.command, "dropping expired XMR message");
            return;
        }

        match msg.command {
            XmrCommand::Heartbeat => {}
            XmrCommand::CollectNow => {
                if let Err(e) = self.collect_once().await {
                    self.faults.report("collect-error", &e.to_string(), "xmr/collectNow", now, None, None, None);
                }
            }
            XmrCommand::ScreenShot => {
                tracing::info!("screenshot requested (platform capture is external)");
            }
            XmrCommand::ChangeLayout { layout_id, .. } => self.change_layout(layout_id).await,
            XmrCommand::OverlayLayout { layout_id } => {
                if !self.active_overlays.contains(&layout_id) {
                    self.active_overlays.push(layout_id);
                }
            }
            XmrCommand::RevertToSchedule => {
                self.pending_layout = None;
                self.reselect().await;
            }
            XmrCommand::PurgeAll => {
                if let Some(hot) = self.renderer.hot_layout_id() {
                    let _ = self.cache.remove_layout_dependants(hot).await;
                }
            }
            XmrCommand::CommandAction { command_code } => {
                tracing::info!(command_code, "commandAction: HTTP webhook dispatch is external");
            }
            XmrCommand::TriggerWebhook { trigger_code } => {
                tracing::info!(trigger_code, "triggerWebhook: HTTP webhook dispatch is external");
            }
            XmrCommand::DataUpdate { data_source_id } => {
                tracing::info!(data_source_id, "dataUpdate: data connector refresh is external");
            }
            XmrCommand::CriteriaUpdate => {
                tracing::debug!("criteriaUpdate received; filter criteria hook is a documented no-op");
            }
            XmrCommand::LicenceCheck => {
                tracing::debug!("licenceCheck: no-op on free builds");
            }
        }
    }

    // ---- Stats/log flush --------------------------------------------------

    async fn flush_stats_and_faults(&mut self) {
        let records = self.stats.drain();
        if !records.is_empty() {
            if let Err(e) = self.cms.submit_stats(&records).await {
                tracing::warn!(error = %e, count = records.len(), "stats submission failed, requeueing");
                self.stats.requeue(records);
            }
        }

        let logs = self.faults.drain();
        if !logs.is_empty() {
            if let Err(e) = self.cms.submit_log(&logs).await {
                tracing::warn!(error = %e, count = logs.len(), "log submission failed, requeueing");
                self.faults.requeue(logs);
            }
        }
    }
}

/// Awaits the next XMR message if a transport is attached, otherwise never
/// resolves — lets the `tokio::select!` arm simply be skipped when XMR is
/// disabled.
async fn next_xmr(xmr: &mut Option<Box<dyn XmrTransport>>) -> Option<XmrMessage> {
    match xmr {
        Some(transport) => transport.next_command().await,
        None => futures::future::pending().await,
    }
}
