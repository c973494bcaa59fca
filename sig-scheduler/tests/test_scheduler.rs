use chrono::{Duration, Utc};
use sig_scheduler::Scheduler;
use sig_types::{Campaign, DayPart, EventTarget, ScheduleEvent};

fn event(id: &str, target: EventTarget, priority: i32) -> ScheduleEvent {
    ScheduleEvent {
        event_id: id.to_string(),
        target,
        from_dt: None,
        to_dt: None,
        priority,
        is_interrupt: false,
        share_of_voice: None,
        day_part: None,
        max_plays_per_hour: None,
        sync_event: false,
        recurrence: Vec::new(),
    }
}

#[test]
fn falls_back_to_default_layout_with_no_active_events() {
    let scheduler = Scheduler::new();
    scheduler.set_schedule(vec![], vec![], Some(99)).unwrap();

    let result = scheduler.select(Utc::now(), None);
    assert_eq!(result.foreground, Some(99));
    assert!(result.pending_layout.is_none());
}

#[test]
fn switching_winner_is_deferred_to_pending_layout_not_preempted() {
    let scheduler = Scheduler::new();
    let events = vec![
        event("e1", EventTarget::Layout(1), 5),
        event("e2", EventTarget::Layout(2), 10),
    ];
    scheduler.set_schedule(events, vec![], None).unwrap();

    let result = scheduler.select(Utc::now(), Some(1));
    assert_eq!(result.foreground, Some(1), "current layout must not be preempted");
    assert_eq!(result.pending_layout, Some(2));
}

#[test]
fn max_plays_per_hour_excludes_layout_until_window_reopens() {
    let scheduler = Scheduler::new();
    let mut e = event("cap", EventTarget::Layout(1), 0);
    e.max_plays_per_hour = Some(2);
    scheduler
        .set_schedule(vec![e], vec![], Some(2))
        .unwrap();

    let t0 = Utc::now();
    scheduler.record_play(1, 30, t0);
    scheduler.record_play(1, 30, t0 + Duration::seconds(30));

    // Two plays within the hour: quota exhausted, falls back to default.
    let result = scheduler.select(t0 + Duration::seconds(60), None);
    assert_eq!(result.foreground, Some(2));

    // One hour and a minute after the first play, quota reopens.
    let result = scheduler.select(t0 + Duration::seconds(3660), None);
    assert_eq!(result.foreground, Some(1));
}

#[test]
fn priority_ties_round_robin_across_consecutive_selections() {
    let scheduler = Scheduler::new();
    let events = vec![
        event("a", EventTarget::Layout(1), 5),
        event("b", EventTarget::Layout(2), 5),
    ];
    scheduler.set_schedule(events, vec![], None).unwrap();

    let now = Utc::now();
    let first = scheduler.select(now, None).foreground;
    let second = scheduler.select(now, None).foreground;
    assert_ne!(first, second, "tied priority events must alternate in stable order");
}

#[test]
fn campaign_layouts_cycle_round_robin() {
    let scheduler = Scheduler::new();
    let campaign = Campaign {
        campaign_id: 1,
        priority: 3,
        layout_ids: vec![10, 20, 30],
    };
    let events = vec![event("c1", EventTarget::Campaign(1), 3)];
    scheduler.set_schedule(events, vec![campaign], None).unwrap();

    let now = Utc::now();
    let first = scheduler.select(now, None).foreground.unwrap();
    let second = scheduler.select(now, None).foreground.unwrap();
    let third = scheduler.select(now, None).foreground.unwrap();
    let fourth = scheduler.select(now, None).foreground.unwrap();
    assert_eq!(vec![first, second, third, fourth], vec![10, 20, 30, 10]);
}

#[test]
fn interrupt_claims_its_share_of_voice_within_the_rolling_hour() {
    let scheduler = Scheduler::new();
    let mut interrupt = event("interrupt", EventTarget::Layout(2), 0);
    interrupt.is_interrupt = true;
    interrupt.share_of_voice = Some(600);
    let normal = event("normal", EventTarget::Layout(1), 0);
    scheduler.set_schedule(vec![normal, interrupt], vec![], Some(1)).unwrap();

    let t0 = Utc::now();
    // Not due immediately: ramps in from the anchor.
    assert_eq!(scheduler.select(t0, None).foreground, Some(1));

    // Halfway through the hour, behind its 600s pace with zero consumed.
    let halfway = t0 + Duration::seconds(1800);
    assert_eq!(scheduler.select(halfway, None).foreground, Some(2));

    // Record the interrupt's play; it should not be due again immediately.
    scheduler.record_play(2, 600, halfway);
    assert_eq!(scheduler.select(halfway + Duration::seconds(1), None).foreground, Some(1));
}

#[test]
fn daypart_window_gates_event_activity() {
    let scheduler = Scheduler::new();
    let mut e = event("dp", EventTarget::Layout(5), 0);
    e.day_part = Some(DayPart {
        days: (1..=7).collect(),
        from_minute: 9 * 60,
        to_minute: 17 * 60,
    });
    scheduler.set_schedule(vec![e], vec![], Some(1)).unwrap();

    let morning = Utc::now()
        .date_naive()
        .and_hms_opt(10, 0, 0)
        .unwrap()
        .and_utc();
    let night = Utc::now()
        .date_naive()
        .and_hms_opt(23, 0, 0)
        .unwrap()
        .and_utc();

    assert_eq!(scheduler.select(morning, None).foreground, Some(5));
    assert_eq!(scheduler.select(night, None).foreground, Some(1));
}

#[test]
fn overlays_are_selected_independently_of_the_foreground_layout() {
    let scheduler = Scheduler::new();
    let events = vec![
        event("main", EventTarget::Layout(1), 0),
        event("ov", EventTarget::Overlay(9), 0),
    ];
    scheduler.set_schedule(events, vec![], None).unwrap();

    let result = scheduler.select(Utc::now(), None);
    assert_eq!(result.foreground, Some(1));
    assert_eq!(result.overlays, vec![9]);
}

#[test]
fn rejects_schedule_with_campaign_missing_layouts() {
    let scheduler = Scheduler::new();
    let campaign = Campaign {
        campaign_id: 1,
        priority: 0,
        layout_ids: vec![],
    };
    let err = scheduler.set_schedule(vec![], vec![campaign], None).unwrap_err();
    assert!(matches!(err, sig_scheduler::Error::EmptyCampaign(1)));
}
