//! Layout/overlay selection: window + daypart filtering,
//! `maxPlaysPerHour` cooldowns, interrupt share-of-voice interleaving,
//! priority selection with round-robin ties, and campaign cycling.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use sig_types::{Campaign, EventTarget, FilterCriteria, ScheduleEvent};

use crate::error::{Error, Result};
use crate::ledger::{InterruptLedger, PlayLedger};

/// Outcome of one selection pass. `foreground` is never preempted mid-cycle:
/// when the winning candidate differs from the currently playing layout,
/// it is returned as `pending_layout` instead, for the caller to apply at
/// the next cycle boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionResult {
    pub foreground: Option<i64>,
    pub pending_layout: Option<i64>,
    pub overlays: Vec<i64>,
}

pub struct Scheduler {
    events: Mutex<Vec<ScheduleEvent>>,
    campaigns: Mutex<HashMap<i64, Campaign>>,
    default_layout_id: Mutex<Option<i64>>,
    plays: Mutex<PlayLedger>,
    interrupts: Mutex<InterruptLedger>,
    campaign_cursor: Mutex<HashMap<i64, usize>>,
    tie_cursor: Mutex<HashMap<i32, usize>>,
    criteria: Mutex<FilterCriteria>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            campaigns: Mutex::new(HashMap::new()),
            default_layout_id: Mutex::new(None),
            plays: Mutex::new(PlayLedger::default()),
            interrupts: Mutex::new(InterruptLedger::default()),
            campaign_cursor: Mutex::new(HashMap::new()),
            tie_cursor: Mutex::new(HashMap::new()),
            criteria: Mutex::new(FilterCriteria::default()),
        }
    }

    /// Replaces the active schedule.
    pub fn set_schedule(
        &self,
        events: Vec<ScheduleEvent>,
        campaigns: Vec<Campaign>,
        default_layout_id: Option<i64>,
    ) -> Result<()> {
        let campaign_map: HashMap<i64, Campaign> =
            campaigns.into_iter().map(|c| (c.campaign_id, c)).collect();

        for campaign in campaign_map.values() {
            if campaign.layout_ids.is_empty() {
                return Err(Error::EmptyCampaign(campaign.campaign_id));
            }
        }
        for event in &events {
            if let EventTarget::Campaign(id) = event.target {
                if !campaign_map.contains_key(&id) {
                    return Err(Error::UnknownCampaign(event.event_id.clone(), id));
                }
            }
        }

        *self.events.lock().unwrap() = events;
        *self.campaigns.lock().unwrap() = campaign_map;
        *self.default_layout_id.lock().unwrap() = default_layout_id;
        Ok(())
    }

    /// `criteriaUpdate` hook (Open Question #2 in the grounding ledger):
    /// stored for future geo/device filtering, never consulted by
    /// [`Self::select`].
    pub fn set_criteria(&self, criteria: FilterCriteria) {
        *self.criteria.lock().unwrap() = criteria;
    }

    pub fn matches_criteria(&self, _candidate: &ScheduleEvent) -> bool {
        true
    }

    /// Must be called exactly once per completed layout cycle, at
    /// `layoutEnd` rather than `layoutStart`, so a layout interrupted
    /// mid-playback never consumes its `maxPlaysPerHour` quota.
    pub fn record_play(&self, layout_id: i64, duration_secs: u32, now: DateTime<Utc>) {
        self.plays.lock().unwrap().record(layout_id, now);

        let events = self.events.lock().unwrap();
        let mut interrupts = self.interrupts.lock().unwrap();
        for event in events.iter() {
            if event.is_interrupt && matches!(event.target, EventTarget::Layout(id) if id == layout_id) {
                interrupts.record(&event.event_id, now, duration_secs);
            }
        }
    }

    pub fn select(&self, now: DateTime<Utc>, current_layout_id: Option<i64>) -> SelectionResult {
        let events = self.events.lock().unwrap();
        let campaigns = self.campaigns.lock().unwrap();
        let mut plays = self.plays.lock().unwrap();
        let mut interrupts = self.interrupts.lock().unwrap();

        let active: Vec<&ScheduleEvent> = events
            .iter()
            .filter(|e| matches!(e.target, EventTarget::Layout(_) | EventTarget::Campaign(_)))
            .filter(|e| e.is_active_window(now))
            .filter(|e| self.matches_criteria(e))
            .filter(|e| !cooldown_exhausted(e, &campaigns, &mut plays, now))
            .collect();

        let (interrupt_events, normal_events): (Vec<_>, Vec<_>) =
            active.into_iter().partition(|e| e.is_interrupt);

        let mut due: Vec<&ScheduleEvent> = interrupt_events
            .into_iter()
            .filter(|e| interrupts.is_due(&e.event_id, now, e.share_of_voice.unwrap_or(0)))
            .collect();
        due.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.event_id.cmp(&b.event_id)));

        let winner_event = due.into_iter().next().or_else(|| self.pick_by_priority(&normal_events));

        let winner_layout = winner_event
            .and_then(|e| self.resolve_target(e, &campaigns))
            .or_else(|| *self.default_layout_id.lock().unwrap());

        let overlays = self.select_overlays(&events, &campaigns, &mut plays, now);

        match winner_layout {
            None => SelectionResult {
                foreground: None,
                pending_layout: None,
                overlays,
            },
            Some(winner) => match current_layout_id {
                None => SelectionResult {
                    foreground: Some(winner),
                    pending_layout: None,
                    overlays,
                },
                Some(cur) if cur == winner => SelectionResult {
                    foreground: Some(cur),
                    pending_layout: None,
                    overlays,
                },
                Some(cur) => SelectionResult {
                    foreground: Some(cur),
                    pending_layout: Some(winner),
                    overlays,
                },
            },
        }
    }

    fn pick_by_priority<'a>(&self, candidates: &[&'a ScheduleEvent]) -> Option<&'a ScheduleEvent> {
        let max_priority = candidates.iter().map(|e| e.priority).max()?;
        let mut tied: Vec<&ScheduleEvent> =
            candidates.iter().copied().filter(|e| e.priority == max_priority).collect();
        tied.sort_by(|a, b| a.event_id.cmp(&b.event_id));

        if tied.len() <= 1 {
            return tied.into_iter().next();
        }

        let mut cursor = self.tie_cursor.lock().unwrap();
        let idx = cursor.entry(max_priority).or_insert(0);
        let chosen = tied[*idx % tied.len()];
        *idx = (*idx + 1) % tied.len();
        Some(chosen)
    }

    fn resolve_target(&self, event: &ScheduleEvent, campaigns: &HashMap<i64, Campaign>) -> Option<i64> {
        match event.target {
            EventTarget::Layout(id) => Some(id),
            EventTarget::Campaign(id) => {
                let campaign = campaigns.get(&id)?;
                let mut cursor = self.campaign_cursor.lock().unwrap();
                let idx = cursor.entry(id).or_insert(0);
                let layout = campaign.layout_ids[*idx % campaign.layout_ids.len()];
                *idx = (*idx + 1) % campaign.layout_ids.len();
                Some(layout)
            }
            _ => None,
        }
    }

    fn select_overlays(
        &self,
        events: &[ScheduleEvent],
        campaigns: &HashMap<i64, Campaign>,
        plays: &mut PlayLedger,
        now: DateTime<Utc>,
    ) -> Vec<i64> {
        let active: Vec<&ScheduleEvent> = events
            .iter()
            .filter(|e| matches!(e.target, EventTarget::Overlay(_)))
            .filter(|e| e.is_active_window(now))
            .filter(|e| self.matches_criteria(e))
            .filter(|e| !cooldown_exhausted(e, campaigns, plays, now))
            .collect();

        let Some(max_priority) = active.iter().map(|e| e.priority).max() else {
            return Vec::new();
        };

        let mut ids: Vec<i64> = active
            .into_iter()
            .filter(|e| e.priority == max_priority)
            .filter_map(|e| match e.target {
                EventTarget::Overlay(id) => Some(id),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn cooldown_exhausted(
    event: &ScheduleEvent,
    campaigns: &HashMap<i64, Campaign>,
    plays: &mut PlayLedger,
    now: DateTime<Utc>,
) -> bool {
    let Some(max) = event.max_plays_per_hour else {
        return false;
    };
    match event.target {
        EventTarget::Layout(id) => plays.count_in_hour(id, now) >= max,
        EventTarget::Campaign(id) => campaigns
            .get(&id)
            .map(|c| {
                let total: u32 = c.layout_ids.iter().map(|&lid| plays.count_in_hour(lid, now)).sum();
                total >= max
            })
            .unwrap_or(false),
        _ => false,
    }
}
