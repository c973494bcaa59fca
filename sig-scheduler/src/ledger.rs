//! Rolling-hour bookkeeping: `maxPlaysPerHour` cooldowns and interrupt
//! share-of-voice consumption. Both are FIFO queues pruned to a trailing
//! window on every read, the same eviction shape as a playlist's rolling
//! history buffer.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

const ROLLING_WINDOW_SECS: i64 = 3600;

/// Timestamps of completed plays for one layout, oldest first.
#[derive(Default)]
pub struct PlayLedger {
    plays: HashMap<i64, VecDeque<DateTime<Utc>>>,
}

impl PlayLedger {
    pub fn record(&mut self, layout_id: i64, now: DateTime<Utc>) {
        let queue = self.plays.entry(layout_id).or_default();
        queue.push_back(now);
        prune(queue, now);
    }

    /// Number of plays still inside the trailing hour as of `now`.
    pub fn count_in_hour(&mut self, layout_id: i64, now: DateTime<Utc>) -> u32 {
        let queue = self.plays.entry(layout_id).or_default();
        prune(queue, now);
        queue.len() as u32
    }
}

fn prune(queue: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    while let Some(front) = queue.front() {
        if now.signed_duration_since(*front).num_seconds() > ROLLING_WINDOW_SECS {
            queue.pop_front();
        } else {
            break;
        }
    }
}

/// One interrupt event's consumed airtime, plus the anchor its expected-pace
/// calculation is measured from (first time it was ever considered).
struct InterruptSlot {
    anchor: DateTime<Utc>,
    slices: VecDeque<(DateTime<Utc>, u32)>,
}

#[derive(Default)]
pub struct InterruptLedger {
    slots: HashMap<String, InterruptSlot>,
}

impl InterruptLedger {
    pub fn record(&mut self, event_id: &str, now: DateTime<Utc>, duration_secs: u32) {
        let slot = self.slot_mut(event_id, now);
        slot.slices.push_back((now, duration_secs));
        prune_slices(&mut slot.slices, now);
    }

    /// Seconds of airtime this event has consumed within the trailing hour.
    pub fn consumed_in_hour(&mut self, event_id: &str, now: DateTime<Utc>) -> u32 {
        let slot = self.slot_mut(event_id, now);
        prune_slices(&mut slot.slices, now);
        slot.slices.iter().map(|(_, d)| *d).sum()
    }

    /// Whether `event_id` is behind its share-of-voice pace and due to air
    /// now. Ramps in over the first hour from its anchor so an interrupt
    /// added at startup doesn't burst its whole quota immediately.
    pub fn is_due(&mut self, event_id: &str, now: DateTime<Utc>, share_of_voice_secs: u32) -> bool {
        if share_of_voice_secs == 0 {
            return false;
        }
        let consumed = self.consumed_in_hour(event_id, now);
        let slot = self.slot_mut(event_id, now);
        let elapsed = now
            .signed_duration_since(slot.anchor)
            .num_seconds()
            .clamp(0, ROLLING_WINDOW_SECS) as f64;
        let expected = share_of_voice_secs as f64 * (elapsed / ROLLING_WINDOW_SECS as f64);
        (consumed as f64) < expected
    }

    fn slot_mut(&mut self, event_id: &str, now: DateTime<Utc>) -> &mut InterruptSlot {
        self.slots.entry(event_id.to_string()).or_insert_with(|| InterruptSlot {
            anchor: now,
            slices: VecDeque::new(),
        })
    }
}

fn prune_slices(queue: &mut VecDeque<(DateTime<Utc>, u32)>, now: DateTime<Utc>) {
    while let Some((ts, _)) = queue.front() {
        if now.signed_duration_since(*ts).num_seconds() > ROLLING_WINDOW_SECS {
            queue.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn play_ledger_prunes_entries_older_than_an_hour() {
        let mut ledger = PlayLedger::default();
        let t0 = Utc::now();
        ledger.record(1, t0);
        ledger.record(1, t0 + Duration::seconds(30));
        assert_eq!(ledger.count_in_hour(1, t0 + Duration::seconds(60)), 2);
        assert_eq!(ledger.count_in_hour(1, t0 + Duration::seconds(3700)), 0);
    }

    #[test]
    fn interrupt_is_not_due_once_quota_is_exhausted_for_the_hour() {
        let mut ledger = InterruptLedger::default();
        let t0 = Utc::now();
        // First touch establishes the anchor.
        assert!(!ledger.is_due("evt", t0, 600));
        let t1 = t0 + Duration::seconds(1800);
        assert!(ledger.is_due("evt", t1, 600));
        ledger.record("evt", t1, 600);
        assert!(!ledger.is_due("evt", t1 + Duration::seconds(1), 600));
        // Once the recorded slice ages out of the rolling window, quota
        // reopens.
        assert!(ledger.is_due("evt", t1 + Duration::seconds(3700), 600));
    }
}
