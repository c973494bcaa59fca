//! Layout/Region/Widget model — the parsed, idiomatic form the renderer
//! consumes. Raw XLF element shapes live in [`crate::xlf`]; this module is
//! what everything downstream actually touches.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::transition::Transition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WidgetType {
    Image,
    Video,
    Audio,
    Webcam,
    Text,
    Pdf,
    Webpage,
    Generic,
}

impl WidgetType {
    pub fn parse(value: &str) -> Self {
        match value {
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "webcam" => Self::Webcam,
            "text" | "ticker" | "text/ticker" => Self::Text,
            "pdf" => Self::Pdf,
            "webpage" => Self::Webpage,
            _ => Self::Generic,
        }
    }

    /// Whether this widget type's duration is driven by the media itself
    /// (video/audio "loadedmetadata") rather than fixed.
    pub fn can_derive_duration(self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioOverlay {
    pub media_id: String,
    pub volume: u8,
    pub loop_playback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub code: String,
}

/// Sub-playlist grouping: widgets sharing `parent_widget_id` with
/// `cycle_playback = true` form a group; one is shown per cycle visit,
/// round-robin unless `is_random`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaylistGrouping {
    pub parent_widget_id: Option<String>,
    pub display_order: i32,
    pub cycle_playback: bool,
    pub is_random: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub widget_type: WidgetType,
    pub file_id: Option<String>,
    /// Bounded duration in seconds. If `use_duration` is false, the real
    /// duration is derived from the media at render time and this value is
    /// only a placeholder until then.
    pub duration: u32,
    pub use_duration: bool,
    pub from_dt: Option<DateTime<Utc>>,
    pub to_dt: Option<DateTime<Utc>>,
    pub trans_in: Option<Transition>,
    pub trans_out: Option<Transition>,
    pub actions: Vec<Action>,
    pub audio_overlays: Vec<AudioOverlay>,
    pub commands: Vec<Command>,
    pub grouping: PlaylistGrouping,
    pub enable_stat: bool,
    /// Inline HTML for text/ticker widgets (XLF `<raw>`), `None` otherwise.
    pub raw_html: Option<String>,
    /// Catch-all for widget-type-specific options not promoted to a typed
    /// field (uri, mute, volume, scaleType, alignId, valignId,
    /// showFullScreen, mirror, captureAudio, modeId, webhookUrl, ...).
    pub options: HashMap<String, String>,
}

impl Widget {
    pub fn is_in_window(&self, now: DateTime<Utc>) -> bool {
        if let Some(from) = self.from_dt {
            if now < from {
                return false;
            }
        }
        if let Some(to) = self.to_dt {
            if now >= to {
                return false;
            }
        }
        true
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.options.get("webhookUrl").map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub zindex: i32,
    pub loop_playback: bool,
    pub exit_transition: Option<Transition>,
    pub widgets: Vec<Widget>,
    pub actions: Vec<Action>,
    pub enable_stat: bool,
    pub is_drawer: bool,
}

impl Region {
    pub fn rect(&self) -> (f64, f64, f64, f64) {
        (self.left, self.top, self.width, self.height)
    }
}

/// Regions hidden by default, revealed by an explicit `navWidget` action.
/// Structurally identical to [`Region`] (`is_drawer = true`, default
/// zindex 2000) — kept as a type alias so call sites read clearly.
pub type Drawer = Region;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub layout_id: i64,
    pub width: f64,
    pub height: f64,
    /// 0 (or `None`) means "compute from widgets".
    pub duration: Option<u32>,
    pub background_color: Option<String>,
    pub background_image_file_id: Option<String>,
    pub regions: Vec<Region>,
    pub drawers: Vec<Drawer>,
    pub actions: Vec<Action>,
    pub enable_stat: bool,
}

impl Layout {
    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions
            .iter()
            .chain(self.drawers.iter())
            .find(|r| r.id == id)
    }

    pub fn find_widget(&self, widget_id: &str) -> Option<(&Region, &Widget)> {
        self.regions
            .iter()
            .chain(self.drawers.iter())
            .find_map(|r| r.widgets.iter().find(|w| w.id == widget_id).map(|w| (r, w)))
    }
}
