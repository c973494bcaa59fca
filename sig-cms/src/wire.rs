//! Typed wire shapes for the XMDS `RequiredFiles`/`Schedule` payloads,
//! and their conversion into `sig_types` model structs. Mirrors
//! `sig_types::xlf`'s "typed struct per element, hand conversion into the
//! idiomatic model" approach.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sig_types::{Campaign, CacheKind, DayPart, EventTarget, RequiredFile, ScheduleEvent};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct FilesElem {
    #[serde(rename = "file", default)]
    file: Vec<FileElem>,
}

#[derive(Debug, Deserialize)]
struct FileElem {
    #[serde(rename = "@type")]
    r#type: String,
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@path", default)]
    path: String,
    #[serde(rename = "@md5", default)]
    md5: String,
    #[serde(rename = "@size", default)]
    size: u64,
    #[serde(rename = "@fileType", default)]
    file_type: Option<String>,
    #[serde(rename = "@code", default)]
    code: Option<String>,
}

pub fn parse_required_files(inner_xml: &str) -> Result<Vec<RequiredFile>> {
    let wrapped = format!("<files>{inner_xml}</files>");
    let parsed: FilesElem = quick_xml::de::from_str(&wrapped)?;
    Ok(parsed
        .file
        .into_iter()
        .filter_map(|f| {
            let kind = CacheKind::from_wire_code(&f.r#type)?;
            Some(RequiredFile {
                kind,
                id: f.id,
                path: f.path,
                md5: f.md5,
                size: f.size,
                file_type: f.file_type,
                code: f.code,
            })
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct ScheduleElem {
    #[serde(rename = "dayPart", default)]
    day_parts: Vec<DayPartElem>,
    #[serde(rename = "layout", default)]
    layouts: Vec<LayoutEventElem>,
    #[serde(rename = "campaign", default)]
    campaigns: Vec<CampaignElem>,
    #[serde(rename = "overlay", default)]
    overlays: Vec<LayoutEventElem>,
    #[serde(rename = "default", default)]
    default: Option<DefaultElem>,
}

#[derive(Debug, Deserialize)]
struct DefaultElem {
    #[serde(rename = "@file")]
    file: i64,
}

#[derive(Debug, Deserialize)]
struct DayPartElem {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@days", default)]
    days: String,
    #[serde(rename = "@fromMinute", default)]
    from_minute: u32,
    #[serde(rename = "@toMinute", default)]
    to_minute: u32,
}

#[derive(Debug, Deserialize)]
struct LayoutEventElem {
    #[serde(rename = "@scheduleid")]
    schedule_id: String,
    #[serde(rename = "@file")]
    file: i64,
    #[serde(rename = "@fromdt", default)]
    from_dt: Option<String>,
    #[serde(rename = "@todt", default)]
    to_dt: Option<String>,
    #[serde(rename = "@priority", default)]
    priority: i32,
    #[serde(rename = "@isInterrupt", default)]
    is_interrupt: bool,
    #[serde(rename = "@shareOfVoice", default)]
    share_of_voice: Option<u32>,
    #[serde(rename = "@dayPartId", default)]
    day_part_id: Option<String>,
    #[serde(rename = "@maxPlaysPerHour", default)]
    max_plays_per_hour: Option<u32>,
    #[serde(rename = "@syncEvent", default)]
    sync_event: bool,
}

#[derive(Debug, Deserialize)]
struct CampaignElem {
    #[serde(rename = "@scheduleid")]
    schedule_id: String,
    #[serde(rename = "@id")]
    id: i64,
    #[serde(rename = "@priority", default)]
    priority: i32,
    #[serde(rename = "@fromdt", default)]
    from_dt: Option<String>,
    #[serde(rename = "@todt", default)]
    to_dt: Option<String>,
    #[serde(rename = "@isInterrupt", default)]
    is_interrupt: bool,
    #[serde(rename = "@shareOfVoice", default)]
    share_of_voice: Option<u32>,
    #[serde(rename = "@dayPartId", default)]
    day_part_id: Option<String>,
    #[serde(rename = "@maxPlaysPerHour", default)]
    max_plays_per_hour: Option<u32>,
    #[serde(rename = "@syncEvent", default)]
    sync_event: bool,
    #[serde(rename = "layout", default)]
    layouts: Vec<CampaignLayoutElem>,
}

#[derive(Debug, Deserialize)]
struct CampaignLayoutElem {
    #[serde(rename = "@file")]
    file: i64,
}

fn parse_dt(value: &Option<String>) -> Option<DateTime<Utc>> {
    let value = value.as_deref()?;
    if value.is_empty() {
        return None;
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn resolve_day_part(
    day_part_id: &Option<String>,
    day_parts: &HashMap<String, DayPart>,
) -> Option<DayPart> {
    day_part_id.as_ref().and_then(|id| day_parts.get(id)).cloned()
}

pub struct ScheduleResponse {
    pub events: Vec<ScheduleEvent>,
    pub campaigns: Vec<Campaign>,
    pub default_layout_id: Option<i64>,
}

/// Parses the `<schedule>` payload into scheduler-ready
/// events/campaigns/default layout.
pub fn parse_schedule(inner_xml: &str) -> Result<ScheduleResponse> {
    let parsed: ScheduleElem = quick_xml::de::from_str(inner_xml)
        .map_err(|e| Error::Protocol(format!("malformed schedule payload: {e}")))?;

    let day_parts: HashMap<String, DayPart> = parsed
        .day_parts
        .into_iter()
        .map(|dp| {
            let days = dp
                .days
                .split(',')
                .filter_map(|s| s.trim().parse::<u8>().ok())
                .collect();
            (
                dp.id,
                DayPart {
                    days,
                    from_minute: dp.from_minute,
                    to_minute: dp.to_minute,
                },
            )
        })
        .collect();

    let mut events = Vec::new();
    for layout in &parsed.layouts {
        events.push(ScheduleEvent {
            event_id: layout.schedule_id.clone(),
            target: EventTarget::Layout(layout.file),
            from_dt: parse_dt(&layout.from_dt),
            to_dt: parse_dt(&layout.to_dt),
            priority: layout.priority,
            is_interrupt: layout.is_interrupt,
            share_of_voice: layout.share_of_voice,
            day_part: resolve_day_part(&layout.day_part_id, &day_parts),
            max_plays_per_hour: layout.max_plays_per_hour,
            sync_event: layout.sync_event,
            recurrence: Vec::new(),
        });
    }
    for overlay in &parsed.overlays {
        events.push(ScheduleEvent {
            event_id: overlay.schedule_id.clone(),
            target: EventTarget::Overlay(overlay.file),
            from_dt: parse_dt(&overlay.from_dt),
            to_dt: parse_dt(&overlay.to_dt),
            priority: overlay.priority,
            is_interrupt: overlay.is_interrupt,
            share_of_voice: overlay.share_of_voice,
            day_part: resolve_day_part(&overlay.day_part_id, &day_parts),
            max_plays_per_hour: overlay.max_plays_per_hour,
            sync_event: overlay.sync_event,
            recurrence: Vec::new(),
        });
    }

    let mut campaigns = Vec::new();
    for c in &parsed.campaigns {
        events.push(ScheduleEvent {
            event_id: c.schedule_id.clone(),
            target: EventTarget::Campaign(c.id),
            from_dt: parse_dt(&c.from_dt),
            to_dt: parse_dt(&c.to_dt),
            priority: c.priority,
            is_interrupt: c.is_interrupt,
            share_of_voice: c.share_of_voice,
            day_part: resolve_day_part(&c.day_part_id, &day_parts),
            max_plays_per_hour: c.max_plays_per_hour,
            sync_event: c.sync_event,
            recurrence: Vec::new(),
        });
        campaigns.push(Campaign {
            campaign_id: c.id,
            priority: c.priority,
            layout_ids: c.layouts.iter().map(|l| l.file).collect(),
        });
    }

    Ok(ScheduleResponse {
        events,
        campaigns,
        default_layout_id: parsed.default.map(|d| d.file),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_files() {
        let xml = r#"<file type="L" id="7" path="7.xlf" md5="abc" size="500"/>
            <file type="M" id="42" path="42.mp4" md5="def" size="1024" fileType="video/mp4"/>"#;
        let files = parse_required_files(xml).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].kind, CacheKind::Layout);
        assert_eq!(files[1].file_type.as_deref(), Some("video/mp4"));
    }

    #[test]
    fn parses_schedule_with_daypart_and_campaign() {
        let xml = r#"<schedule>
            <dayPart id="dp1" days="1,2,3,4,5" fromMinute="540" toMinute="1080"/>
            <layout scheduleid="s1" file="7" priority="0" dayPartId="dp1"/>
            <campaign scheduleid="s2" id="99" priority="1" isInterrupt="1" shareOfVoice="600">
                <layout file="10"/>
                <layout file="11"/>
            </campaign>
            <default file="1"/>
        </schedule>"#;
        let parsed = parse_schedule(xml).unwrap();
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.campaigns.len(), 1);
        assert_eq!(parsed.campaigns[0].layout_ids, vec![10, 11]);
        assert_eq!(parsed.default_layout_id, Some(1));
        let layout_event = parsed
            .events
            .iter()
            .find(|e| matches!(e.target, EventTarget::Layout(7)))
            .unwrap();
        assert!(layout_event.day_part.is_some());
    }
}
