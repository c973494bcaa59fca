//! Schedule descriptors: events, campaigns, dayparts and (stored-but-unused)
//! filter criteria.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// What a [`ScheduleEvent`] ultimately points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTarget {
    Layout(i64),
    Campaign(i64),
    Overlay(i64),
    Command(String),
    Action(String),
    DataConnector(String),
}

/// One `(day-of-week set, fromTime, toTime)` recurrence rule. Times are
/// minutes-since-midnight so a `toTime < fromTime` crossing can be tested
/// without re-parsing strings on every scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPart {
    /// ISO day-of-week, Mon=1..Sun=7.
    pub days: Vec<u8>,
    pub from_minute: u32,
    pub to_minute: u32,
}

impl DayPart {
    pub fn iso_weekday(day: Weekday) -> u8 {
        day.number_from_monday() as u8
    }

    /// Whether `now` falls inside this daypart. Handles midnight-crossing
    /// triples (`to_minute < from_minute`) by treating the window as
    /// wrapping past 24:00 (an overnight daypart like 22:00-06:00).
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let weekday = Self::iso_weekday(now.weekday());
        let minute_of_day = (now.time().num_seconds_from_midnight() / 60) as u32;

        if self.from_minute <= self.to_minute {
            self.days.contains(&weekday)
                && minute_of_day >= self.from_minute
                && minute_of_day < self.to_minute
        } else {
            // Wraps midnight: active if it's the start day past from_minute,
            // or the following day before to_minute.
            let prev_weekday = if weekday == 1 { 7 } else { weekday - 1 };
            (self.days.contains(&weekday) && minute_of_day >= self.from_minute)
                || (self.days.contains(&prev_weekday) && minute_of_day < self.to_minute)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub event_id: String,
    pub target: EventTarget,
    pub from_dt: Option<DateTime<Utc>>,
    pub to_dt: Option<DateTime<Utc>>,
    pub priority: i32,
    pub is_interrupt: bool,
    /// Seconds-per-hour guaranteed airtime, only meaningful if `is_interrupt`.
    pub share_of_voice: Option<u32>,
    pub day_part: Option<DayPart>,
    pub max_plays_per_hour: Option<u32>,
    pub sync_event: bool,
    pub recurrence: Vec<DayPart>,
}

impl ScheduleEvent {
    pub fn is_active_window(&self, now: DateTime<Utc>) -> bool {
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
        if let Some(dp) = &self.day_part {
            if !dp.contains(now) {
                return false;
            }
        }
        if !self.recurrence.is_empty() && !self.recurrence.iter().any(|dp| dp.contains(now)) {
            return false;
        }
        true
    }
}

/// An ordered set of layouts played round-robin as a single scheduling unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub campaign_id: i64,
    pub priority: i32,
    pub layout_ids: Vec<i64>,
}

/// `criteriaUpdate` payload: parsed and stored, never enforced. Filter
/// criteria enforcement is left as a documented hook for a future caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub entries: Vec<(String, String)>,
}
