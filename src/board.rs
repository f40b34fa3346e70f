//! Arrival boards: per-stop upcoming arrivals within a short window.
//!
//! A whole feed group is flattened into per-stop arrival lists once, and
//! individual stop boards are sliced out of that. The human-readable ETA
//! text is always recomputed against the caller's clock, so a cached group
//! can serve a board without the text going stale.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::feed::types::{FeedEntity, ScheduleRelationship};
use crate::stations::base_stop_id;

/// How far ahead of now an arrival may be and still appear on a board.
pub const WINDOW_AHEAD_MINUTES: i64 = 20;
/// How far in the past an arrival may be; a train at the platform has an
/// arrival time slightly behind the clock.
pub const WINDOW_BEHIND_MINUTES: i64 = 1;
/// Boards are for glanceable signage, not full timetables.
pub const MAX_ITEMS_PER_STOP: usize = 8;

/// One upcoming arrival on a board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalItem {
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub when: DateTime<Utc>,
    /// Wall-clock time in the system timezone, `HH:MM`.
    pub when_local: String,
    pub eta_text: String,
    pub route_id: String,
    pub trip_id: String,
    pub schedule_relationship: ScheduleRelationship,
    pub delay_seconds: Option<i64>,
}

/// All boards for one feed group, cacheable as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupArrivals {
    pub stops: HashMap<String, Vec<ArrivalItem>>,
    pub generated_at: DateTime<Utc>,
}

/// The board for a single stop.
#[derive(Debug, Clone, Serialize)]
pub struct ArrivalBoard {
    pub stop_id: String,
    pub items: Vec<ArrivalItem>,
    pub generated_at: DateTime<Utc>,
}

/// Flatten feed entities into per-stop arrival lists, keyed by the stop id
/// exactly as the feed reports it (a platform board must not show the
/// opposite platform's arrivals). Only arrivals within the lookahead and
/// lookbehind window around `now` are kept, sorted soonest first and capped
/// per stop.
pub fn build_group_arrivals(
    entities: &[FeedEntity],
    tz: Tz,
    now: DateTime<Utc>,
) -> GroupArrivals {
    let earliest = now - Duration::minutes(WINDOW_BEHIND_MINUTES);
    let latest = now + Duration::minutes(WINDOW_AHEAD_MINUTES);
    let mut stops: HashMap<String, Vec<ArrivalItem>> = HashMap::new();

    for entity in entities {
        for update in &entity.stop_updates {
            let Some(when) = update.arrival.as_ref().and_then(|a| a.time) else {
                continue;
            };
            if when < earliest || when > latest {
                continue;
            }
            let item = ArrivalItem {
                stop_id: update.stop_id.clone(),
                stop_name: update.stop_name.clone(),
                when,
                when_local: when.with_timezone(&tz).format("%H:%M").to_string(),
                eta_text: relative_eta(when, now),
                route_id: entity.route_id.clone(),
                trip_id: entity.trip_id.clone(),
                schedule_relationship: update.schedule_relationship,
                delay_seconds: update.arrival.as_ref().and_then(|a| a.delay.map(i64::from)),
            };
            stops
                .entry(update.stop_id.clone())
                .or_default()
                .push(item);
        }
    }

    for items in stops.values_mut() {
        items.sort_by_key(|item| item.when);
        items.truncate(MAX_ITEMS_PER_STOP);
    }

    GroupArrivals {
        stops,
        generated_at: now,
    }
}

/// Slice one stop's board out of a group, recomputing the ETA text against
/// the current clock. A miss on the exact id retries the direction-stripped
/// base id (feeds sometimes key by parent rather than platform); a base-id
/// query merges all of its platforms.
pub fn board_for_stop(
    group: &GroupArrivals,
    stop_id: &str,
    now: DateTime<Utc>,
) -> ArrivalBoard {
    let base = base_stop_id(stop_id);
    let mut items: Vec<ArrivalItem> = match group
        .stops
        .get(stop_id)
        .or_else(|| group.stops.get(base))
    {
        Some(items) => items.clone(),
        None => {
            let mut merged: Vec<ArrivalItem> = group
                .stops
                .iter()
                .filter(|(key, _)| base_stop_id(key) == base)
                .flat_map(|(_, items)| items.iter().cloned())
                .collect();
            merged.sort_by_key(|item| item.when);
            merged.truncate(MAX_ITEMS_PER_STOP);
            merged
        }
    };
    for item in &mut items {
        item.eta_text = relative_eta(item.when, now);
    }

    ArrivalBoard {
        stop_id: stop_id.to_string(),
        items,
        generated_at: group.generated_at,
    }
}

/// Signage-style relative time: "now" within half a minute, else whole
/// minutes ahead or behind.
pub fn relative_eta(when: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (when - now).num_seconds();
    if seconds.abs() < 30 {
        return "now".to_string();
    }
    let minutes = ((seconds as f64) / 60.0).round() as i64;
    if minutes >= 0 {
        format!("in {} min", minutes.max(1))
    } else {
        format!("{} min ago", (-minutes).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{StopTimeInfo, StopUpdate};
    use chrono_tz::America::New_York;

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn update(stop_id: &str, minutes_from_now: i64) -> StopUpdate {
        StopUpdate {
            stop_id: stop_id.to_string(),
            stop_name: Some("Test St".to_string()),
            arrival: Some(StopTimeInfo {
                time: Some(now() + Duration::minutes(minutes_from_now)),
                delay: None,
            }),
            departure: None,
            schedule_relationship: ScheduleRelationship::Scheduled,
        }
    }

    fn entity(trip_id: &str, updates: Vec<StopUpdate>) -> FeedEntity {
        FeedEntity {
            route_id: "1".to_string(),
            trip_id: trip_id.to_string(),
            start_date: None,
            vehicle_id: None,
            stop_updates: updates,
            timestamp: Some(now()),
        }
    }

    #[test]
    fn window_filters_and_sorts() {
        let entities = vec![
            entity("t1", vec![update("101N", 5)]),
            entity("t2", vec![update("101N", 25)]), // beyond the window
            entity("t3", vec![update("101N", 2)]),
            entity("t4", vec![update("101N", -5)]), // stale
        ];
        let group = build_group_arrivals(&entities, New_York, now());

        let items = &group.stops["101N"];
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].trip_id, "t3");
        assert_eq!(items[1].trip_id, "t1");
        assert_eq!(items[0].eta_text, "in 2 min");
    }

    #[test]
    fn just_arrived_trains_stay_on_the_board() {
        let entities = vec![entity("t1", vec![update("101N", 0)])];
        let group = build_group_arrivals(&entities, New_York, now() + Duration::seconds(45));
        assert_eq!(group.stops["101N"].len(), 1);
    }

    #[test]
    fn platform_board_excludes_opposite_direction() {
        let entities = vec![
            entity("north", vec![update("101N", 5)]),
            entity("south", vec![update("101S", 3)]),
        ];
        let group = build_group_arrivals(&entities, New_York, now());

        let north = board_for_stop(&group, "101N", now());
        assert_eq!(north.items.len(), 1);
        assert_eq!(north.items[0].trip_id, "north");

        let south = board_for_stop(&group, "101S", now());
        assert_eq!(south.items.len(), 1);
        assert_eq!(south.items[0].trip_id, "south");
    }

    #[test]
    fn cap_applies_per_platform() {
        // a busy southbound platform must not evict the other direction
        let mut entities: Vec<FeedEntity> = (1..=MAX_ITEMS_PER_STOP as i64)
            .map(|m| entity(&format!("south{m}"), vec![update("101S", m)]))
            .collect();
        entities.push(entity("north", vec![update("101N", 10)]));
        let group = build_group_arrivals(&entities, New_York, now());

        assert_eq!(group.stops["101S"].len(), MAX_ITEMS_PER_STOP);
        let north = board_for_stop(&group, "101N", now());
        assert_eq!(north.items.len(), 1);
        assert_eq!(north.items[0].trip_id, "north");
    }

    #[test]
    fn per_stop_cap_keeps_the_soonest_arrivals() {
        let updates: Vec<StopUpdate> = (1..=12).map(|m| update("101N", m)).collect();
        let entities: Vec<FeedEntity> = updates
            .into_iter()
            .enumerate()
            .map(|(i, u)| entity(&format!("t{i}"), vec![u]))
            .collect();
        let group = build_group_arrivals(&entities, New_York, now());
        assert_eq!(group.stops["101N"].len(), MAX_ITEMS_PER_STOP);
        assert_eq!(group.stops["101N"][0].eta_text, "in 1 min");
    }

    #[test]
    fn base_id_query_merges_platforms() {
        let entities = vec![
            entity("north", vec![update("101N", 5)]),
            entity("south", vec![update("101S", 3)]),
        ];
        let group = build_group_arrivals(&entities, New_York, now());

        let board = board_for_stop(&group, "101", now());
        assert_eq!(board.items.len(), 2);
        assert_eq!(board.items[0].trip_id, "south");
        assert_eq!(board.items[1].trip_id, "north");
    }

    #[test]
    fn empty_platform_falls_back_to_parent_and_refreshes_eta() {
        let entities = vec![entity("t1", vec![update("101N", 5)])];
        let group = build_group_arrivals(&entities, New_York, now());

        // the southbound platform has no entries of its own; the stripped
        // parent id retry finds the station's remaining arrivals
        let board = board_for_stop(&group, "101S", now() + Duration::minutes(3));
        assert_eq!(board.items.len(), 1);
        assert_eq!(board.items[0].eta_text, "in 2 min");
        assert_eq!(board.stop_id, "101S");

        let empty = board_for_stop(&group, "999", now());
        assert!(empty.items.is_empty());
    }

    #[test]
    fn parent_keyed_feed_serves_platform_queries() {
        // some upstream feeds key by parent station outright
        let entities = vec![entity("t1", vec![update("101", 4)])];
        let group = build_group_arrivals(&entities, New_York, now());

        let board = board_for_stop(&group, "101N", now());
        assert_eq!(board.items.len(), 1);
        assert_eq!(board.items[0].trip_id, "t1");
    }

    #[test]
    fn local_time_renders_in_system_timezone() {
        // 12:00 UTC on 2026-03-01 is 07:00 EST
        let entities = vec![entity("t1", vec![update("101N", 0)])];
        let group = build_group_arrivals(&entities, New_York, now());
        assert_eq!(group.stops["101N"][0].when_local, "07:00");
    }

    #[test]
    fn relative_eta_phrasing() {
        assert_eq!(relative_eta(now(), now()), "now");
        assert_eq!(relative_eta(now() + Duration::seconds(29), now()), "now");
        assert_eq!(relative_eta(now() + Duration::seconds(45), now()), "in 1 min");
        assert_eq!(relative_eta(now() + Duration::minutes(7), now()), "in 7 min");
        assert_eq!(relative_eta(now() - Duration::seconds(90), now()), "2 min ago");
    }
}
