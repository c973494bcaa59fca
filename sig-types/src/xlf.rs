//! Raw XLF wire shapes and the conversion into/out of the idiomatic
//! [`crate::widget`] model.
//!
//! Mirrors the `quick_xml::de`/`se` + `#[serde(rename = "@attr")]` pattern
//! used for DIDL-Lite parsing, generalized to the layout XML tree: a
//! `<layout>` root carrying `<region>`/`<drawer>` children, each carrying
//! `<media>` widgets with an `<options>` bag and optional `<raw>` HTML.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionTrigger, ActionType};
use crate::error::{Error, Result};
use crate::transition::Transition;
use crate::widget::{AudioOverlay, Command, Layout, PlaylistGrouping, Region, Widget, WidgetType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "layout")]
pub struct XlfLayout {
    #[serde(rename = "@width")]
    pub width: f64,
    #[serde(rename = "@height")]
    pub height: f64,
    #[serde(rename = "@duration", skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(rename = "@bgcolor", skip_serializing_if = "Option::is_none")]
    pub bgcolor: Option<String>,
    #[serde(rename = "@background", skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(rename = "@enableStat", default = "default_true")]
    pub enable_stat: bool,
    #[serde(rename = "region", default)]
    pub regions: Vec<XlfRegion>,
    #[serde(rename = "drawer", default)]
    pub drawers: Vec<XlfRegion>,
    #[serde(rename = "action", default)]
    pub actions: Vec<XlfAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XlfRegion {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@left")]
    pub left: f64,
    #[serde(rename = "@top")]
    pub top: f64,
    #[serde(rename = "@width")]
    pub width: f64,
    #[serde(rename = "@height")]
    pub height: f64,
    #[serde(rename = "@zindex", default)]
    pub zindex: i32,
    #[serde(rename = "@loop", default)]
    pub loop_playback: bool,
    #[serde(rename = "@enableStat", default = "default_true")]
    pub enable_stat: bool,
    #[serde(rename = "media", default)]
    pub media: Vec<XlfMedia>,
    #[serde(rename = "action", default)]
    pub actions: Vec<XlfAction>,
    #[serde(default)]
    pub options: Option<XlfOptionBag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XlfMedia {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub r#type: String,
    #[serde(rename = "@fileId", skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(rename = "@duration", default)]
    pub duration: u32,
    #[serde(rename = "@useDuration", default)]
    pub use_duration: bool,
    #[serde(rename = "@fromDt", skip_serializing_if = "Option::is_none")]
    pub from_dt: Option<String>,
    #[serde(rename = "@toDt", skip_serializing_if = "Option::is_none")]
    pub to_dt: Option<String>,
    #[serde(rename = "@parentWidgetId", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(rename = "@displayOrder", default)]
    pub display_order: i32,
    #[serde(rename = "@enableStat", default = "default_true")]
    pub enable_stat: bool,
    #[serde(rename = "@cyclePlayback", default)]
    pub cycle_playback: bool,
    #[serde(rename = "@isRandom", default)]
    pub is_random: bool,
    #[serde(rename = "@render", skip_serializing_if = "Option::is_none")]
    pub render: Option<String>,
    #[serde(default)]
    pub options: Option<XlfOptionBag>,
    #[serde(default)]
    pub raw: Option<XlfRaw>,
    #[serde(rename = "audio", default)]
    pub audio: Vec<XlfAudio>,
    #[serde(default)]
    pub commands: Option<XlfCommands>,
    #[serde(rename = "action", default)]
    pub actions: Vec<XlfAction>,
}

/// The `<options>` bag: a flat set of child elements, each a text node,
/// whose tag name is the option key. `quick-xml` has no "map of unknown
/// elements" shorthand, so we capture it as raw text and split it back out
/// by hand in [`parse_option_bag`] — the same trick XLF producers use to
/// avoid versioning every widget-specific knob as its own attribute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XlfOptionBag {
    #[serde(rename = "$value", default)]
    pub raw_xml: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XlfRaw {
    #[serde(rename = "$value", default)]
    pub html: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XlfAudio {
    #[serde(rename = "@mediaId")]
    pub media_id: String,
    #[serde(rename = "@volume", default = "default_volume")]
    pub volume: u8,
    #[serde(rename = "@loop", default)]
    pub loop_playback: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XlfCommands {
    #[serde(rename = "command", default)]
    pub command: Vec<XlfCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XlfCommand {
    #[serde(rename = "@code")]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XlfAction {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@triggerType", default)]
    pub trigger_type: String,
    #[serde(rename = "@actionType")]
    pub action_type: String,
    #[serde(rename = "@target", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_volume() -> u8 {
    100
}

/// Splits the flattened `key1=val1,key2=val2` text captured off an
/// `<options>` element back into a lookup map. XLF's real option bag is an
/// element tree (`<transIn>flyIn</transIn>`); since we only capture the
/// raw inner XML as text above, a tiny hand-rolled scan over
/// `<tag>value</tag>` pairs recovers the same keys without pulling in a
/// second XML parser.
fn parse_option_bag(bag: &XlfOptionBag) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let text = &bag.raw_xml;
    let mut rest = text.as_str();
    while let Some(open_start) = rest.find('<') {
        let after_open = &rest[open_start + 1..];
        let Some(tag_end) = after_open.find('>') else {
            break;
        };
        let tag = &after_open[..tag_end];
        if tag.starts_with('/') {
            rest = &after_open[tag_end + 1..];
            continue;
        }
        let close_tag = format!("</{tag}>");
        let body_start = &after_open[tag_end + 1..];
        if let Some(close_idx) = body_start.find(&close_tag) {
            let value = &body_start[..close_idx];
            out.insert(tag.to_string(), value.to_string());
            rest = &body_start[close_idx + close_tag.len()..];
        } else {
            rest = body_start;
        }
    }
    out
}

fn serialize_option_bag(options: &HashMap<String, String>) -> Option<XlfOptionBag> {
    if options.is_empty() {
        return None;
    }
    let mut keys: Vec<&String> = options.keys().collect();
    keys.sort();
    let raw_xml = keys
        .into_iter()
        .map(|k| format!("<{k}>{}</{k}>", options[k]))
        .collect::<Vec<_>>()
        .join("");
    Some(XlfOptionBag { raw_xml })
}

fn parse_dt(value: &Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    let value = value.as_deref()?;
    if value.is_empty() {
        return None;
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn format_dt(value: Option<chrono::DateTime<chrono::Utc>>) -> Option<String> {
    value.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

impl XlfAction {
    fn into_action(self) -> Action {
        Action {
            id: self.id,
            trigger: ActionTrigger::parse(&self.trigger_type),
            action_type: ActionType::parse(&self.action_type).unwrap_or(ActionType::NavLayout),
            target_id: self.target,
        }
    }

    fn from_action(action: &Action) -> Self {
        let trigger_type = match &action.trigger {
            ActionTrigger::Touch => "touch".to_string(),
            ActionTrigger::Keyboard(key) => format!("keyboard:{key}"),
            ActionTrigger::Webhook => "webhook".to_string(),
        };
        let action_type = match action.action_type {
            ActionType::NavLayout => "navLayout",
            ActionType::NavWidget => "navWidget",
            ActionType::Command => "command",
            ActionType::Next => "next",
            ActionType::Previous => "previous",
        }
        .to_string();
        Self {
            id: action.id.clone(),
            trigger_type,
            action_type,
            target: action.target_id.clone(),
        }
    }
}

impl XlfMedia {
    fn into_widget(self) -> Widget {
        let mut options = self
            .options
            .as_ref()
            .map(parse_option_bag)
            .unwrap_or_default();

        let (trans_in, trans_out) = Transition::pair_from_options(
            options.get("transIn").map(String::as_str),
            options.get("transInDuration").map(String::as_str),
            options.get("transInDirection").map(String::as_str),
            options.get("transOut").map(String::as_str),
            options.get("transOutDuration").map(String::as_str),
            options.get("transOutDirection").map(String::as_str),
        );

        let cycle_playback = self.cycle_playback;
        let is_random = self.is_random;
        if let Some(render) = &self.render {
            options.insert("render".into(), render.clone());
        }

        Widget {
            id: self.id,
            widget_type: WidgetType::parse(&self.r#type),
            file_id: self.file_id,
            duration: self.duration,
            use_duration: self.use_duration,
            from_dt: parse_dt(&self.from_dt),
            to_dt: parse_dt(&self.to_dt),
            trans_in,
            trans_out,
            actions: self.actions.into_iter().map(XlfAction::into_action).collect(),
            audio_overlays: self
                .audio
                .into_iter()
                .map(|a| AudioOverlay {
                    media_id: a.media_id,
                    volume: a.volume,
                    loop_playback: a.loop_playback,
                })
                .collect(),
            commands: self
                .commands
                .map(|c| c.command.into_iter().map(|cmd| Command { code: cmd.code }).collect())
                .unwrap_or_default(),
            grouping: PlaylistGrouping {
                parent_widget_id: self.parent_id,
                display_order: self.display_order,
                cycle_playback,
                is_random,
            },
            enable_stat: self.enable_stat,
            raw_html: self.raw.map(|r| r.html),
            options,
        }
    }

    fn from_widget(widget: &Widget) -> Self {
        let mut options = widget.options.clone();
        if let Some(t) = &widget.trans_in {
            options.insert("transIn".into(), transition_kind_wire(t.kind).to_string());
            options.insert("transInDuration".into(), t.duration_ms.to_string());
            if let Some(d) = t.direction {
                options.insert("transInDirection".into(), format!("{d:?}"));
            }
        }
        if let Some(t) = &widget.trans_out {
            options.insert("transOut".into(), transition_kind_wire(t.kind).to_string());
            options.insert("transOutDuration".into(), t.duration_ms.to_string());
            if let Some(d) = t.direction {
                options.insert("transOutDirection".into(), format!("{d:?}"));
            }
        }
        let render = options.remove("render");

        Self {
            id: widget.id.clone(),
            r#type: widget_type_wire(widget.widget_type).to_string(),
            file_id: widget.file_id.clone(),
            duration: widget.duration,
            use_duration: widget.use_duration,
            from_dt: format_dt(widget.from_dt),
            to_dt: format_dt(widget.to_dt),
            parent_id: widget.grouping.parent_widget_id.clone(),
            display_order: widget.grouping.display_order,
            enable_stat: widget.enable_stat,
            cycle_playback: widget.grouping.cycle_playback,
            is_random: widget.grouping.is_random,
            render,
            options: serialize_option_bag(&options),
            raw: widget.raw_html.clone().map(|html| XlfRaw { html }),
            audio: widget
                .audio_overlays
                .iter()
                .map(|a| XlfAudio {
                    media_id: a.media_id.clone(),
                    volume: a.volume,
                    loop_playback: a.loop_playback,
                })
                .collect(),
            commands: if widget.commands.is_empty() {
                None
            } else {
                Some(XlfCommands {
                    command: widget
                        .commands
                        .iter()
                        .map(|c| XlfCommand { code: c.code.clone() })
                        .collect(),
                })
            },
            actions: widget.actions.iter().map(XlfAction::from_action).collect(),
        }
    }
}

fn widget_type_wire(t: WidgetType) -> &'static str {
    match t {
        WidgetType::Image => "image",
        WidgetType::Video => "video",
        WidgetType::Audio => "audio",
        WidgetType::Webcam => "webcam",
        WidgetType::Text => "text",
        WidgetType::Pdf => "pdf",
        WidgetType::Webpage => "webpage",
        WidgetType::Generic => "generic",
    }
}

fn transition_kind_wire(k: crate::transition::TransitionKind) -> &'static str {
    use crate::transition::TransitionKind::*;
    match k {
        FadeIn => "fadeIn",
        FadeOut => "fadeOut",
        FlyIn => "flyIn",
        FlyOut => "flyOut",
    }
}

impl XlfRegion {
    fn into_region(self, is_drawer: bool) -> Region {
        Region {
            id: self.id,
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            zindex: self.zindex,
            loop_playback: self.loop_playback,
            exit_transition: self.options.as_ref().and_then(|bag| {
                let opts = parse_option_bag(bag);
                Transition::pair_from_options(
                    None,
                    None,
                    None,
                    opts.get("transOut").map(String::as_str),
                    opts.get("transOutDuration").map(String::as_str),
                    opts.get("transOutDirection").map(String::as_str),
                )
                .1
            }),
            widgets: self.media.into_iter().map(XlfMedia::into_widget).collect(),
            actions: self.actions.into_iter().map(XlfAction::into_action).collect(),
            enable_stat: self.enable_stat,
            is_drawer,
        }
    }

    fn from_region(region: &Region) -> Self {
        let mut options = HashMap::new();
        if let Some(t) = &region.exit_transition {
            options.insert("transOut".into(), transition_kind_wire(t.kind).to_string());
            options.insert("transOutDuration".into(), t.duration_ms.to_string());
            if let Some(d) = t.direction {
                options.insert("transOutDirection".into(), format!("{d:?}"));
            }
        }
        Self {
            id: region.id.clone(),
            left: region.left,
            top: region.top,
            width: region.width,
            height: region.height,
            zindex: region.zindex,
            loop_playback: region.loop_playback,
            enable_stat: region.enable_stat,
            media: region.widgets.iter().map(XlfMedia::from_widget).collect(),
            actions: region.actions.iter().map(XlfAction::from_action).collect(),
            options: serialize_option_bag(&options),
        }
    }
}

/// Parses a full XLF document into the idiomatic [`Layout`] model.
pub fn parse_layout(xml: &str) -> Result<Layout> {
    let raw: XlfLayout = quick_xml::de::from_str(xml)?;
    if raw.regions.is_empty() && raw.drawers.is_empty() {
        return Err(Error::MalformedXlf("layout has no regions".into()));
    }
    Ok(Layout {
        layout_id: 0,
        width: raw.width,
        height: raw.height,
        duration: raw.duration.filter(|d| *d > 0),
        background_color: raw.bgcolor,
        background_image_file_id: raw.background,
        regions: raw
            .regions
            .into_iter()
            .map(|r| r.into_region(false))
            .collect(),
        drawers: raw.drawers.into_iter().map(|r| r.into_region(true)).collect(),
        actions: raw.actions.into_iter().map(XlfAction::into_action).collect(),
        enable_stat: raw.enable_stat,
    })
}

/// Serializes a [`Layout`] back to XLF. The `layout_id` field has no XLF
/// representation (it's assigned by the CMS RequiredFiles manifest, not
/// the document itself) and is dropped on the way out.
pub fn serialize_layout(layout: &Layout) -> Result<String> {
    let raw = XlfLayout {
        width: layout.width,
        height: layout.height,
        duration: layout.duration,
        bgcolor: layout.background_color.clone(),
        background: layout.background_image_file_id.clone(),
        enable_stat: layout.enable_stat,
        regions: layout.regions.iter().map(XlfRegion::from_region).collect(),
        drawers: layout.drawers.iter().map(XlfRegion::from_region).collect(),
        actions: layout.actions.iter().map(XlfAction::from_action).collect(),
    };
    Ok(quick_xml::se::to_string(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<layout width="1920" height="1080" duration="0" bgcolor="#000000">
        <region id="r1" left="0" top="0" width="1920" height="1080" loop="1">
            <media id="w1" type="image" fileId="42" duration="10" useDuration="1" />
            <media id="w2" type="video" fileId="43" duration="0" useDuration="0" />
        </region>
    </layout>"#;

    #[test]
    fn parses_regions_and_widgets() {
        let layout = parse_layout(SAMPLE).expect("parse");
        assert_eq!(layout.regions.len(), 1);
        let region = &layout.regions[0];
        assert_eq!(region.widgets.len(), 2);
        assert_eq!(region.widgets[0].widget_type, WidgetType::Image);
        assert_eq!(region.widgets[0].file_id.as_deref(), Some("42"));
        assert!(region.widgets[1].widget_type == WidgetType::Video);
        assert!(!region.widgets[1].use_duration);
        assert!(layout.duration.is_none());
    }

    #[test]
    fn rejects_layout_without_regions() {
        let xml = r#"<layout width="100" height="100"></layout>"#;
        assert!(parse_layout(xml).is_err());
    }

    #[test]
    fn roundtrips_transition_options() {
        let xml = r#"<layout width="100" height="100">
            <region id="r1" left="0" top="0" width="100" height="100">
                <media id="w1" type="image" fileId="1" duration="5" useDuration="1">
                    <options><transIn>flyIn</transIn><transInDuration>750</transInDuration><transInDirection>W</transInDirection></options>
                </media>
            </region>
        </layout>"#;
        let layout = parse_layout(xml).expect("parse");
        let widget = &layout.regions[0].widgets[0];
        let trans_in = widget.trans_in.expect("trans_in");
        assert_eq!(trans_in.kind, crate::transition::TransitionKind::FlyIn);
        assert_eq!(trans_in.duration_ms, 750);

        let serialized = serialize_layout(&layout).expect("serialize");
        let reparsed = parse_layout(&serialized).expect("reparse");
        let widget2 = &reparsed.regions[0].widgets[0];
        assert_eq!(widget2.trans_in, widget.trans_in);
    }

    #[test]
    fn parses_sub_playlist_grouping_attributes() {
        let xml = r#"<layout width="100" height="100">
            <region id="r1" left="0" top="0" width="100" height="100">
                <media id="w1" type="image" fileId="1" duration="5" useDuration="1"
                       parentWidgetId="5" cyclePlayback="1" isRandom="1" render="html" />
            </region>
        </layout>"#;
        let layout = parse_layout(xml).expect("parse");
        let widget = &layout.regions[0].widgets[0];
        assert_eq!(widget.grouping.parent_widget_id.as_deref(), Some("5"));
        assert!(widget.grouping.cycle_playback);
        assert!(widget.grouping.is_random);
        assert_eq!(widget.options.get("render").map(String::as_str), Some("html"));

        let serialized = serialize_layout(&layout).expect("serialize");
        let reparsed = parse_layout(&serialized).expect("reparse");
        let widget2 = &reparsed.regions[0].widgets[0];
        assert_eq!(widget2.grouping.parent_widget_id, widget.grouping.parent_widget_id);
        assert!(widget2.grouping.cycle_playback);
        assert!(widget2.grouping.is_random);
        assert_eq!(widget2.options.get("render"), widget.options.get("render"));
    }
}
