//! `LayoutInstance`: the arena-backed analogue of a rendered layout's DOM
//! subtree. `RegionArena`/`WidgetArena` are realized
//! here as plain `Vec`s indexed by position — regions and widgets are
//! parsed once into an immutable `Layout` and never reordered, so dense
//! indices are simpler than a generational arena and just as safe.

use std::collections::HashMap;
use std::time::Duration;

use sig_types::{CacheKind, Region, Widget};
use tokio::task::JoinHandle;

use crate::media::{MediaRef, WidgetContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Scheduled,
    Showing,
    Hidden,
}

/// A widget's "element": position inherited from its `Widget`/`Region`,
/// plus the mutable showing/hidden state a DOM node would otherwise carry.
pub struct WidgetSlot {
    pub widget: Widget,
    pub state: WidgetState,
    pub content: WidgetContent,
    pub resolved_duration: u32,
}

impl WidgetSlot {
    fn new(widget: Widget) -> Self {
        let resolved_duration = widget.duration;
        Self {
            widget,
            state: WidgetState::Scheduled,
            content: WidgetContent::None,
            resolved_duration,
        }
    }
}

pub struct RegionRuntime {
    pub region: Region,
    pub slots: Vec<WidgetSlot>,
    pub current_index: usize,
    pub cycle_complete: bool,
    pub group_cursor: HashMap<String, usize>,
    pub widget_timer: Option<JoinHandle<()>>,
    /// Bumped every time the region's current layout render/replay starts,
    /// so a timer that fires after `stopCurrentLayout` already reset the
    /// region can recognize it's stale and no-op instead of advancing a
    /// region nobody is tracking anymore.
    pub generation: u64,
}

impl RegionRuntime {
    pub fn new(region: Region) -> Self {
        let slots = region.widgets.iter().cloned().map(WidgetSlot::new).collect();
        Self {
            region,
            slots,
            current_index: 0,
            cycle_complete: false,
            group_cursor: HashMap::new(),
            widget_timer: None,
            generation: 0,
        }
    }

    pub fn reset(&mut self) {
        if let Some(handle) = self.widget_timer.take() {
            handle.abort();
        }
        self.current_index = 0;
        self.cycle_complete = false;
        self.generation += 1;
        for slot in &mut self.slots {
            slot.state = WidgetState::Scheduled;
        }
    }
}

pub struct LayoutInstance {
    pub layout_id: i64,
    pub width: f64,
    pub height: f64,
    pub explicit_duration: Option<u32>,
    pub regions: Vec<RegionRuntime>,
    pub drawers: Vec<RegionRuntime>,
    /// `(kind, fileId) -> MediaRef`, scoped to this layout instance — the
    /// analogue of `layoutBlobUrls[layoutId]`/`mediaUrlCache`.
    pub media_refs: HashMap<(CacheKind, String), MediaRef>,
    pub layout_timer: Option<JoinHandle<()>>,
    pub preload_timer: Option<JoinHandle<()>>,
    pub layout_end_emitted: bool,
    pub scale: (f64, f64, f64, f64),
    pub generation: u64,
}

impl LayoutInstance {
    pub fn new(layout: &sig_types::Layout) -> Self {
        Self {
            layout_id: layout.layout_id,
            width: layout.width,
            height: layout.height,
            explicit_duration: layout.duration.filter(|d| *d > 0),
            regions: layout.regions.iter().cloned().map(RegionRuntime::new).collect(),
            drawers: layout.drawers.iter().cloned().map(RegionRuntime::new).collect(),
            media_refs: HashMap::new(),
            layout_timer: None,
            preload_timer: None,
            layout_end_emitted: false,
            scale: (1.0, 0.0, 0.0, 1.0),
            generation: 0,
        }
    }

    /// Layout duration = max across non-drawer regions of the sum of that
    /// region's widget durations, unless the XLF specified an explicit
    /// `duration > 0`.
    pub fn compute_duration(&self) -> Duration {
        if let Some(explicit) = self.explicit_duration {
            return Duration::from_secs(explicit as u64);
        }
        let max_region_secs = self
            .regions
            .iter()
            .map(|r| r.slots.iter().map(|s| s.resolved_duration as u64).sum::<u64>())
            .max()
            .unwrap_or(0);
        Duration::from_secs(max_region_secs.max(1))
    }

    pub fn abort_all_timers(&mut self) {
        if let Some(h) = self.layout_timer.take() {
            h.abort();
        }
        if let Some(h) = self.preload_timer.take() {
            h.abort();
        }
        for region in self.regions.iter_mut().chain(self.drawers.iter_mut()) {
            if let Some(h) = region.widget_timer.take() {
                h.abort();
            }
        }
    }

    pub fn find_widget_region_mut(&mut self, widget_id: &str) -> Option<(&mut RegionRuntime, usize)> {
        for region in self.regions.iter_mut().chain(self.drawers.iter_mut()) {
            if let Some(idx) = region.slots.iter().position(|s| s.widget.id == widget_id) {
                return Some((region, idx));
            }
        }
        None
    }
}
