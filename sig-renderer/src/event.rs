//! Renderer lifecycle events. A closed `broadcast` channel
//! replaces the DOM event emitter the original renderer used: `PlayerCore`
//! drains it from the single task that owns playback state, tests attach
//! extra subscribers freely.

use sig_types::{Action, CacheKind, WidgetType};
use tokio::sync::broadcast;

/// Generous enough that a slow consumer doesn't need to be the common case,
/// not so large that a truly stuck consumer hides the problem.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum RendererEvent {
    LayoutStart { layout_id: i64 },
    LayoutEnd { layout_id: i64 },
    WidgetStart {
        widget_id: String,
        region_id: String,
        layout_id: i64,
        media_id: Option<String>,
        widget_type: WidgetType,
        duration: u32,
        enable_stat: bool,
    },
    WidgetEnd {
        widget_id: String,
        region_id: String,
        layout_id: i64,
    },
    /// Region/layout-level interactive trigger (touch/keyboard/webhook).
    ActionTrigger { layout_id: i64, action: Action },
    /// Interactive trigger attached directly to a widget container, kept
    /// distinct from `ActionTrigger` so consumers can tell whether the
    /// widget itself or its enclosing region/layout was the target.
    WidgetAction {
        widget_id: String,
        region_id: String,
        layout_id: i64,
        action: Action,
    },
    /// A widget's `<commands>` fired; executing them is external.
    WidgetCommand {
        widget_id: String,
        region_id: String,
        layout_id: i64,
        command_code: String,
    },
    Fault { context: String, message: String },
    MediaCached { kind: CacheKind, id: String },
    /// Hint for `PlayerCore` to peek the scheduler and call
    /// `Renderer::preload_layout`.
    RequestNextLayoutPreload { current_layout_id: i64 },
    Paused { layout_id: i64 },
    Resumed { layout_id: i64 },
}

pub fn channel() -> (broadcast::Sender<RendererEvent>, broadcast::Receiver<RendererEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
