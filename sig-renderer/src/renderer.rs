//! The layout runtime itself: render flow, region/widget cycling, preload
//! scheduling, pause/resume, interactive actions.
//!
//! Timers are `tokio::time::sleep` futures spawned as their own tasks,
//! tracked as `JoinHandle`s so `stopCurrentLayout`-style cancellation is a
//! plain `.abort()` — the direct analogue of `setTimeout`/`clearTimeout`
//!. Rather than let those tasks reach back into shared mutable state,
//! each one sends a `Tick` over an unbounded channel that the owning task
//! drains via [`Renderer::poll_tick`]; this keeps all layout/region/widget
//! state single-owner
//! while still giving timers real cancellation semantics.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sig_types::{Action, ActionTrigger, CacheKind, Layout};
use tokio::sync::{broadcast, mpsc};

use crate::error::{Error, Result};
use crate::event::{channel, RendererEvent};
use crate::grouping::resolve_playback_order;
use crate::instance::{LayoutInstance, RegionRuntime, WidgetState};
use crate::media::{MediaRef, MediaResolver, WidgetContent};
use crate::pool::LayoutPool;

const READINESS_TIMEOUT: Duration = Duration::from_secs(10);
const PRELOAD_THRESHOLDS: [f64; 2] = [0.75, 0.90];

enum Tick {
    Widget { layout_id: i64, region_id: String, generation: u64 },
    Layout { layout_id: i64, generation: u64 },
    Preload { layout_id: i64, generation: u64 },
}

pub struct Renderer {
    pool: LayoutPool,
    resolver: Arc<dyn MediaResolver>,
    events_tx: broadcast::Sender<RendererEvent>,
    tick_tx: mpsc::UnboundedSender<Tick>,
    tick_rx: mpsc::UnboundedReceiver<Tick>,
    open_drawers: HashSet<String>,
    paused: bool,
}

impl Renderer {
    pub fn new(resolver: Arc<dyn MediaResolver>) -> Self {
        let (events_tx, _) = channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        Self {
            pool: LayoutPool::new(),
            resolver,
            events_tx,
            tick_tx,
            tick_rx,
            open_drawers: HashSet::new(),
            paused: false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RendererEvent> {
        self.events_tx.subscribe()
    }

    pub fn hot_layout_id(&self) -> Option<i64> {
        self.pool.hot_layout_id()
    }

    fn emit(&self, event: RendererEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Waits for and applies the next pending timer tick. Intended to sit
    /// inside the owner's `tokio::select!` loop alongside the collection
    /// interval and XMR receiver.
    pub async fn poll_tick(&mut self) {
        if let Some(tick) = self.tick_rx.recv().await {
            self.apply_tick(tick).await;
        }
    }

    async fn apply_tick(&mut self, tick: Tick) {
        match tick {
            Tick::Widget { layout_id, region_id, generation } => {
                self.advance_region(layout_id, &region_id, generation).await;
            }
            Tick::Layout { layout_id, generation } => {
                self.finish_layout(layout_id, generation);
            }
            Tick::Preload { layout_id, generation } => {
                if self.pool.hot_layout_id() == Some(layout_id)
                    && self.pool.hot.as_ref().map(|l| l.generation) == Some(generation)
                {
                    self.emit(RendererEvent::RequestNextLayoutPreload { current_layout_id: layout_id });
                }
            }
        }
    }

    // ---- Render flow ----------

    pub async fn render(&mut self, layout: &Layout) -> Result<()> {
        if layout.regions.is_empty() && layout.drawers.is_empty() {
            return Err(Error::EmptyLayout(layout.layout_id));
        }

        if self.pool.hot_layout_id() == Some(layout.layout_id) {
            self.replay_current(layout).await;
            return Ok(());
        }

        if self.pool.is_warm(layout.layout_id) {
            self.swap_to_preloaded(layout.layout_id).await;
            return Ok(());
        }

        self.cold_render(layout).await;
        Ok(())
    }

    async fn replay_current(&mut self, layout: &Layout) {
        let layout_id = layout.layout_id;
        if let Some(hot) = self.pool.hot.as_mut() {
            hot.abort_all_timers();
            hot.layout_end_emitted = false;
            hot.generation += 1;
            for region in hot.regions.iter_mut().chain(hot.drawers.iter_mut()) {
                region.reset();
            }
        }
        self.open_drawers.clear();
        self.emit(RendererEvent::LayoutStart { layout_id });
        self.start_all_regions(layout_id).await;
        self.start_layout_timer(layout_id);
    }

    async fn swap_to_preloaded(&mut self, layout_id: i64) {
        if let Some(mut old_hot) = self.pool.make_hot(layout_id) {
            old_hot.abort_all_timers();
            self.resolver.remove_layout_dependants(old_hot.layout_id).await;
        }
        self.open_drawers.clear();
        self.emit(RendererEvent::LayoutStart { layout_id });
        self.start_all_regions(layout_id).await;
        self.start_layout_timer(layout_id);
        self.schedule_preload_hints(layout_id);
    }

    async fn cold_render(&mut self, layout: &Layout) {
        let mut instance = LayoutInstance::new(layout);
        self.prefetch_media(&mut instance, layout).await;

        if let Some(mut old_hot) = self.pool.set_hot(instance) {
            old_hot.abort_all_timers();
            self.resolver.remove_layout_dependants(old_hot.layout_id).await;
        }
        self.open_drawers.clear();

        let layout_id = layout.layout_id;
        self.emit(RendererEvent::LayoutStart { layout_id });
        self.start_all_regions(layout_id).await;
        self.start_layout_timer(layout_id);
        self.schedule_preload_hints(layout_id);
    }

    /// Builds a hidden, fully pre-fetched instance and adds it to the pool
    /// as warm, without starting any timers or emitting events.
    pub async fn preload_layout(&mut self, layout: &Layout) {
        if self.pool.has(layout.layout_id) {
            return;
        }
        let mut instance = LayoutInstance::new(layout);
        self.prefetch_media(&mut instance, layout).await;
        self.pool.add_warm(instance);
    }

    async fn prefetch_media(&self, instance: &mut LayoutInstance, layout: &Layout) {
        for region in instance.regions.iter_mut().chain(instance.drawers.iter_mut()) {
            for slot in &mut region.slots {
                if let Some(file_id) = slot.widget.file_id.clone() {
                    let kind = CacheKind::Media;
                    self.resolver.add_dependant(kind, &file_id, layout.layout_id).await;
                    if let Some((url, media_type)) = self.resolver.resolve_media(kind, &file_id).await {
                        instance.media_refs.entry((kind, file_id.clone())).or_insert_with(|| MediaRef {
                            kind,
                            id: file_id.clone(),
                            content: WidgetContent::Media { url: url.clone(), media_type: media_type.clone() },
                        });
                        slot.content = WidgetContent::Media { url, media_type };
                    }
                } else if let Some(html) = slot.widget.raw_html.clone() {
                    slot.content = WidgetContent::Html { html, media_urls: Vec::new() };
                } else if matches!(slot.widget.widget_type, sig_types::WidgetType::Webpage | sig_types::WidgetType::Generic) {
                    if let Some((html, media_urls, duration_override)) = self
                        .resolver
                        .resolve_widget_html(layout.layout_id, &region.region.id, &slot.widget.id)
                        .await
                    {
                        slot.content = WidgetContent::Html { html, media_urls };
                        if let Some(duration) = duration_override {
                            slot.resolved_duration = duration;
                        }
                    }
                }
            }
        }
    }

    // ---- Region/widget cycling -----------------

    async fn start_all_regions(&mut self, layout_id: i64) {
        let region_ids: Vec<String> = {
            let Some(hot) = self.pool.hot.as_ref() else { return };
            hot.regions.iter().map(|r| r.region.id.clone()).collect()
        };
        for region_id in region_ids {
            self.start_region(layout_id, &region_id).await;
        }
    }

    async fn start_region(&mut self, layout_id: i64, region_id: &str) {
        let Some(hot) = self.pool.hot.as_mut() else { return };
        if hot.layout_id != layout_id {
            return;
        }
        let Some(region) = hot.regions.iter_mut().find(|r| r.region.id == region_id) else {
            return;
        };
        let order = resolve_playback_order(
            &region.slots.iter().map(|s| s.widget.clone()).collect::<Vec<_>>(),
            &mut region.group_cursor,
            chrono::Utc::now(),
        );
        if order.is_empty() {
            return;
        }
        region.current_index = 0;
        drop(hot);
        self.show_region_widget(layout_id, region_id, order).await;
    }

    async fn show_region_widget(&mut self, layout_id: i64, region_id: &str, order: Vec<usize>) {
        let (widget, generation, duration, single_static) = {
            let Some(hot) = self.pool.hot.as_mut() else { return };
            if hot.layout_id != layout_id {
                return;
            }
            let Some(region) = hot.regions.iter_mut().chain(hot.drawers.iter_mut()).find(|r| r.region.id == region_id) else {
                return;
            };
            let idx = order[region.current_index % order.len()];
            for (i, slot) in region.slots.iter_mut().enumerate() {
                if i != idx {
                    slot.state = WidgetState::Hidden;
                }
            }
            let slot = &mut region.slots[idx];
            slot.state = WidgetState::Showing;
            let single_static = !region.region.loop_playback && order.len() == 1;
            (slot.widget.clone(), region.generation, slot.resolved_duration, single_static)
        };

        self.emit(RendererEvent::WidgetStart {
            widget_id: widget.id.clone(),
            region_id: region_id.to_string(),
            layout_id,
            media_id: widget.file_id.clone(),
            widget_type: widget.widget_type,
            duration,
            enable_stat: widget.enable_stat,
        });

        for command in &widget.commands {
            self.emit(RendererEvent::WidgetCommand {
                widget_id: widget.id.clone(),
                region_id: region_id.to_string(),
                layout_id,
                command_code: command.code.clone(),
            });
        }

        if single_static {
            return;
        }

        let region_id_owned = region_id.to_string();
        let tx = self.tick_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(duration.max(1) as u64)).await;
            let _ = tx.send(Tick::Widget { layout_id, region_id: region_id_owned, generation });
        });
        if let Some(hot) = self.pool.hot.as_mut() {
            if let Some(region) = hot.regions.iter_mut().chain(hot.drawers.iter_mut()).find(|r| r.region.id == region_id) {
                region.widget_timer = Some(handle);
            }
        }
    }

    async fn advance_region(&mut self, layout_id: i64, region_id: &str, generation: u64) {
        let Some(hot) = self.pool.hot.as_mut() else { return };
        if hot.layout_id != layout_id {
            return;
        }
        let Some(region) = hot.regions.iter_mut().chain(hot.drawers.iter_mut()).find(|r| r.region.id == region_id) else {
            return;
        };
        if region.generation != generation {
            return; // stale timer from a layout/region that already reset
        }

        let order = resolve_playback_order(
            &region.slots.iter().map(|s| s.widget.clone()).collect::<Vec<_>>(),
            &mut region.group_cursor,
            chrono::Utc::now(),
        );
        if order.is_empty() {
            return;
        }
        let current_idx = order[region.current_index % order.len()];
        let finishing_widget = region.slots[current_idx].widget.clone();
        region.slots[current_idx].state = WidgetState::Hidden;

        drop(hot);
        self.emit(RendererEvent::WidgetEnd {
            widget_id: finishing_widget.id.clone(),
            region_id: region_id.to_string(),
            layout_id,
        });

        let Some(hot) = self.pool.hot.as_mut() else { return };
        let Some(region) = hot.regions.iter_mut().chain(hot.drawers.iter_mut()).find(|r| r.region.id == region_id) else {
            return;
        };

        let next_index = (region.current_index + 1) % order.len();
        let wrapped = next_index == 0;

        if wrapped && !region.region.loop_playback {
            // Stay on the last widget, no further timer.
            region.current_index = order.len() - 1;
            let last_idx = order[region.current_index];
            region.slots[last_idx].state = WidgetState::Showing;
            return;
        }

        if wrapped {
            region.cycle_complete = true;
        }
        region.current_index = next_index;
        drop(hot);
        self.show_region_widget(layout_id, region_id, order).await;
    }

    // ---- Layout timer -------------------

    fn start_layout_timer(&mut self, layout_id: i64) {
        let Some(hot) = self.pool.hot.as_mut() else { return };
        let duration = hot.compute_duration();
        hot.layout_end_emitted = false;
        let generation = hot.generation;
        let tx = self.tick_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(Tick::Layout { layout_id, generation });
        });
        hot.layout_timer = Some(handle);
    }

    fn finish_layout(&mut self, layout_id: i64, generation: u64) {
        let Some(hot) = self.pool.hot.as_mut() else { return };
        if hot.layout_id != layout_id || hot.generation != generation || hot.layout_end_emitted {
            return;
        }
        hot.layout_end_emitted = true;
        self.emit(RendererEvent::LayoutEnd { layout_id });
    }

    /// Re-derives and restarts the layout timer, e.g. after a video's
    /// `loadedmetadata` changed a widget's dynamic duration. Here: recompute from current `resolved_duration`
    /// values and reschedule from now, since we have no real elapsed-time
    /// accounting without a live video element.
    pub fn update_widget_duration(&mut self, widget_id: &str, new_duration_secs: u32) {
        let Some(hot) = self.pool.hot.as_mut() else { return };
        if let Some((region, idx)) = hot.find_widget_region_mut(widget_id) {
            region.slots[idx].resolved_duration = new_duration_secs;
        }
        if let Some(h) = hot.layout_timer.take() {
            h.abort();
        }
        let layout_id = hot.layout_id;
        self.start_layout_timer(layout_id);
    }

    fn schedule_preload_hints(&mut self, layout_id: i64) {
        let Some(hot) = self.pool.hot.as_ref() else { return };
        let total = hot.compute_duration();
        let generation = hot.generation;
        for fraction in PRELOAD_THRESHOLDS {
            let delay = Duration::from_secs_f64(total.as_secs_f64() * fraction);
            let tx = self.tick_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Tick::Preload { layout_id, generation });
            });
        }
    }

    // ---- Pause/resume ----------------------------

    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        if let Some(hot) = self.pool.hot.as_mut() {
            hot.abort_all_timers();
            self.emit_paused(hot.layout_id);
        }
    }

    fn emit_paused(&self, layout_id: i64) {
        self.emit(RendererEvent::Paused { layout_id });
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        let layout_id = match self.pool.hot_layout_id() {
            Some(id) => id,
            None => return,
        };
        self.start_layout_timer(layout_id);
        self.emit(RendererEvent::Resumed { layout_id });

        // Restart each region's cycle timer for the widget currently
        // marked Showing. Exact elapsed-time resumption isn't tracked
        // since there is no real media clock backing these durations;
        // this restarts the remaining-duration clock from the showing
        // widget's full duration (documented simplification).
        let Some(hot) = self.pool.hot.as_mut() else { return };
        for region in hot.regions.iter_mut().chain(hot.drawers.iter_mut()) {
            let Some(showing) = region.slots.iter().position(|s| s.state == WidgetState::Showing) else {
                continue;
            };
            if region.slots.len() == 1 && !region.region.loop_playback {
                continue;
            }
            let duration = region.slots[showing].resolved_duration.max(1) as u64;
            let generation = region.generation;
            let region_id = region.region.id.clone();
            let tx = self.tick_tx.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(duration)).await;
                let _ = tx.send(Tick::Widget { layout_id, region_id, generation });
            });
            region.widget_timer = Some(handle);
        }
    }

    // ---- Interactive actions --------------

    pub fn dispatch_touch(&self, owner_id: &str) {
        for action in self.actions_for(owner_id, |t| matches!(t, ActionTrigger::Touch)) {
            self.emit_action(owner_id, action);
        }
    }

    pub fn dispatch_keyboard(&self, key: &str) {
        let matches_key = |trigger: &ActionTrigger| matches!(trigger, ActionTrigger::Keyboard(k) if k == key);
        let Some(hot) = self.pool.hot.as_ref() else { return };
        let layout_id = hot.layout_id;
        for action in hot.regions.iter().chain(hot.drawers.iter()).flat_map(|r| {
            r.region
                .actions
                .iter()
                .cloned()
                .chain(r.slots.iter().flat_map(|s| s.widget.actions.iter().cloned()))
        }) {
            if matches_key(&action.trigger) {
                self.emit(RendererEvent::ActionTrigger { layout_id, action });
            }
        }
    }

    pub fn dispatch_webhook(&self, action_id: &str) {
        for action in self.actions_for(action_id, |t| matches!(t, ActionTrigger::Webhook)) {
            self.emit_action(action_id, action);
        }
    }

    fn emit_action(&self, owner_id: &str, action: Action) {
        let Some(hot) = self.pool.hot.as_ref() else { return };
        let layout_id = hot.layout_id;
        if let Some((region, _)) = hot
            .regions
            .iter()
            .chain(hot.drawers.iter())
            .find_map(|r| r.slots.iter().position(|s| s.widget.id == owner_id).map(|i| (r, i)))
        {
            self.emit(RendererEvent::WidgetAction {
                widget_id: owner_id.to_string(),
                region_id: region.region.id.clone(),
                layout_id,
                action,
            });
        } else {
            self.emit(RendererEvent::ActionTrigger { layout_id, action });
        }
    }

    fn actions_for(&self, owner_id: &str, matches: impl Fn(&ActionTrigger) -> bool) -> Vec<Action> {
        let Some(hot) = self.pool.hot.as_ref() else { return Vec::new() };
        let mut found = Vec::new();
        if owner_id == "layout" {
            found.extend(Vec::new()); // layout-level actions carried separately by PlayerCore
        }
        for region in hot.regions.iter().chain(hot.drawers.iter()) {
            if region.region.id == owner_id {
                found.extend(region.region.actions.iter().filter(|a| matches(&a.trigger)).cloned());
            }
            for slot in &region.slots {
                if slot.widget.id == owner_id {
                    found.extend(slot.widget.actions.iter().filter(|a| matches(&a.trigger)).cloned());
                }
            }
        }
        found
    }

    /// `navWidget`: reveals the target's drawer if needed, cancels the
    /// target region's timer, and shows the target widget directly.
    pub async fn navigate_to_widget(&mut self, widget_id: &str) -> Result<()> {
        let (region_id, is_drawer, target_index) = {
            let hot = self.pool.hot.as_ref().ok_or(Error::NoHotLayout)?;
            hot.drawers
                .iter()
                .map(|r| (r, true))
                .chain(hot.regions.iter().map(|r| (r, false)))
                .find_map(|(r, is_drawer)| {
                    r.slots
                        .iter()
                        .position(|s| s.widget.id == widget_id)
                        .map(|idx| (r.region.id.clone(), is_drawer, idx))
                })
                .ok_or_else(|| Error::UnknownWidget(widget_id.to_string()))?
        };

        if is_drawer {
            self.open_drawers.insert(region_id.clone());
        }

        let layout_id = self.pool.hot_layout_id().ok_or(Error::NoHotLayout)?;
        if let Some(hot) = self.pool.hot.as_mut() {
            if let Some(region) = hot.regions.iter_mut().chain(hot.drawers.iter_mut()).find(|r| r.region.id == region_id) {
                if let Some(h) = region.widget_timer.take() {
                    h.abort();
                }
                region.current_index = target_index;
            }
        }
        let order: Vec<usize> = {
            let hot = self.pool.hot.as_ref().ok_or(Error::NoHotLayout)?;
            let region = hot
                .regions
                .iter()
                .chain(hot.drawers.iter())
                .find(|r| r.region.id == region_id)
                .ok_or_else(|| Error::UnknownRegion(region_id.clone()))?;
            (0..region.slots.len()).collect()
        };
        self.show_region_widget(layout_id, &region_id, order).await;
        Ok(())
    }

    /// `next`/`previous`: advances the given region's current index by
    /// `delta` (wrapping), independent of the region's own timer firing.
    pub async fn advance(&mut self, region_id: &str, delta: i32) -> Result<()> {
        let layout_id = self.pool.hot_layout_id().ok_or(Error::NoHotLayout)?;
        let (order, new_index) = {
            let hot = self.pool.hot.as_mut().ok_or(Error::NoHotLayout)?;
            let region = hot
                .regions
                .iter_mut()
                .chain(hot.drawers.iter_mut())
                .find(|r| r.region.id == region_id)
                .ok_or_else(|| Error::UnknownRegion(region_id.to_string()))?;
            if let Some(h) = region.widget_timer.take() {
                h.abort();
            }
            let order = resolve_playback_order(
                &region.slots.iter().map(|s| s.widget.clone()).collect::<Vec<_>>(),
                &mut region.group_cursor,
                chrono::Utc::now(),
            );
            if order.is_empty() {
                return Ok(());
            }
            let len = order.len() as i32;
            let new_index = (region.current_index as i32 + delta).rem_euclid(len) as usize;
            region.current_index = new_index;
            (order, new_index)
        };
        let _ = new_index;
        self.show_region_widget(layout_id, region_id, order).await;
        Ok(())
    }
}
