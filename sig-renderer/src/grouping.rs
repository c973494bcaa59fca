//! Sub-playlist cycle-playback grouping: widgets sharing a `parentWidgetId` with `cyclePlayback=true`
//! form a group; one is shown per region visit, round-robin unless
//! `isRandom`. Counters are per-process, never persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use sig_types::Widget;

/// Resolves the ordered list of widget indices a region should actually
/// cycle through at `now`: widgets outside their `fromDt`/`toDt` window are
/// excluded entirely for this render; of the remainder, ungrouped widgets
/// pass through unchanged and each cycling group contributes exactly one
/// representative per call.
pub fn resolve_playback_order(
    widgets: &[Widget],
    cursor: &mut HashMap<String, usize>,
    now: DateTime<Utc>,
) -> Vec<usize> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    let mut order = Vec::new();

    for (idx, widget) in widgets.iter().enumerate() {
        if !widget.is_in_window(now) {
            continue;
        }
        match &widget.grouping.parent_widget_id {
            Some(parent) if widget.grouping.cycle_playback => {
                groups.entry(parent.clone()).or_default().push(idx);
            }
            _ => order.push(idx),
        }
    }

    // Groups are inserted in widget display order by using the group's
    // first member's original index as its position in the final order.
    let mut group_positions: Vec<(usize, String, Vec<usize>)> = groups
        .into_iter()
        .map(|(parent, mut members)| {
            members.sort_by_key(|&i| widgets[i].grouping.display_order);
            let first = members[0];
            (first, parent, members)
        })
        .collect();
    group_positions.sort_by_key(|(first, _, _)| *first);

    for (first_idx, parent, members) in group_positions {
        let is_random = widgets[members[0]].grouping.cycle_playback && widgets[members[0]].grouping.is_random;
        let chosen = if is_random {
            members[rand::rng().random_range(0..members.len())]
        } else {
            let slot = cursor.entry(parent).or_insert(0);
            let chosen = members[*slot % members.len()];
            *slot = (*slot + 1) % members.len();
            chosen
        };
        order.insert(order.partition_point(|&i| i < first_idx), chosen);
    }

    order.sort();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use sig_types::{PlaylistGrouping, WidgetType};

    fn widget(id: &str, parent: Option<&str>, order: i32, random: bool) -> Widget {
        Widget {
            id: id.to_string(),
            widget_type: WidgetType::Image,
            file_id: None,
            duration: 10,
            use_duration: true,
            from_dt: None,
            to_dt: None,
            trans_in: None,
            trans_out: None,
            actions: Vec::new(),
            audio_overlays: Vec::new(),
            commands: Vec::new(),
            grouping: PlaylistGrouping {
                parent_widget_id: parent.map(str::to_string),
                display_order: order,
                cycle_playback: parent.is_some(),
                is_random: random,
            },
            enable_stat: true,
            raw_html: None,
            options: Default::default(),
        }
    }

    #[test]
    fn round_robins_through_group_members() {
        let widgets = vec![
            widget("a", Some("p1"), 0, false),
            widget("b", Some("p1"), 1, false),
            widget("standalone", None, 0, false),
        ];
        let mut cursor = HashMap::new();

        let now = chrono::Utc::now();
        let first = resolve_playback_order(&widgets, &mut cursor, now);
        let second = resolve_playback_order(&widgets, &mut cursor, now);
        let third = resolve_playback_order(&widgets, &mut cursor, now);

        assert!(first.contains(&2));
        let group_pick_1 = *first.iter().find(|&&i| i != 2).unwrap();
        let group_pick_2 = *second.iter().find(|&&i| i != 2).unwrap();
        let group_pick_3 = *third.iter().find(|&&i| i != 2).unwrap();
        assert_ne!(group_pick_1, group_pick_2);
        assert_eq!(group_pick_1, group_pick_3);
    }

    #[test]
    fn widget_with_future_from_dt_is_excluded_from_the_render() {
        let now = chrono::Utc::now();
        let mut future = widget("future", None, 0, false);
        future.from_dt = Some(now + chrono::Duration::hours(1));
        let widgets = vec![widget("current", None, 0, false), future];
        let mut cursor = HashMap::new();

        let order = resolve_playback_order(&widgets, &mut cursor, now);

        assert_eq!(order, vec![0]);
    }
}
