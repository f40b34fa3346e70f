//! Realtime feed fetching, decoding, and normalization.
//!
//! Fetches one binary protobuf feed per group, decodes it against the GTFS-RT
//! schema, and maps trip updates into the engine's `FeedEntity` records with
//! stop names resolved from the static stop dictionary.

pub mod groups;
pub mod types;

use std::time::Duration;

use chrono::{DateTime, Utc};
use prost::Message;

use crate::error::EngineError;
use crate::stations::StationRegistry;
use types::{FeedEntity, ScheduleRelationship, StopTimeInfo, StopUpdate};

/// Maximum allowed protobuf response size (8 MB; a single group's feed is
/// well under 1 MB in practice).
const MAX_PROTOBUF_SIZE: usize = 8 * 1024 * 1024;

/// Fetch and decode one group's raw feed message.
pub(crate) async fn fetch_feed_message(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<gtfs_realtime::FeedMessage, EngineError> {
    let mut request = client.get(url).timeout(timeout);
    if let Some(key) = api_key {
        request = request.header("x-api-key", key);
    }

    let response = request.send().await?;

    if !response.status().is_success() {
        return Err(EngineError::NetworkMessage(format!(
            "feed HTTP {}",
            response.status()
        )));
    }

    let bytes = response.bytes().await?;

    if bytes.len() > MAX_PROTOBUF_SIZE {
        return Err(EngineError::NetworkMessage(format!(
            "feed response too large: {} bytes (max {} bytes)",
            bytes.len(),
            MAX_PROTOBUF_SIZE
        )));
    }

    gtfs_realtime::FeedMessage::decode(bytes.as_ref()).map_err(EngineError::from)
}

/// Map a decoded feed message into normalized entities.
///
/// Entities without a trip update or trip id are dropped; stop updates
/// keep their feed order, which defines the trip's remaining path.
pub fn normalize_feed(
    feed: &gtfs_realtime::FeedMessage,
    stations: &StationRegistry,
) -> Vec<FeedEntity> {
    let feed_timestamp = feed
        .header
        .timestamp
        .and_then(|t| DateTime::from_timestamp(t as i64, 0));

    let mut entities = Vec::new();

    for entity in &feed.entity {
        let Some(trip_update) = &entity.trip_update else {
            continue;
        };
        let Some(trip_id) = trip_update.trip.trip_id.clone() else {
            continue;
        };

        let stop_updates = trip_update
            .stop_time_update
            .iter()
            .filter_map(|stu| {
                let stop_id = stu.stop_id.clone()?;
                Some(StopUpdate {
                    stop_name: stations.name(&stop_id),
                    arrival: stu.arrival.as_ref().map(convert_event),
                    departure: stu.departure.as_ref().map(convert_event),
                    schedule_relationship: ScheduleRelationship::from_gtfs(
                        stu.schedule_relationship,
                    ),
                    stop_id,
                })
            })
            .collect();

        entities.push(FeedEntity {
            route_id: trip_update.trip.route_id.clone().unwrap_or_default(),
            trip_id,
            start_date: trip_update.trip.start_date.clone(),
            vehicle_id: trip_update.vehicle.as_ref().and_then(|v| v.id.clone()),
            stop_updates,
            timestamp: trip_update
                .timestamp
                .and_then(|t| DateTime::from_timestamp(t as i64, 0))
                .or(feed_timestamp),
        });
    }

    entities
}

fn convert_event(event: &gtfs_realtime::trip_update::StopTimeEvent) -> StopTimeInfo {
    StopTimeInfo {
        time: event.time.and_then(|t| DateTime::from_timestamp(t, 0)),
        delay: event.delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stations::Station;

    fn make_registry() -> StationRegistry {
        StationRegistry::from_stations(vec![
            Station {
                stop_id: "101N".into(),
                name: Some("Van Cortlandt Park-242 St".into()),
                lat: Some(40.889),
                lon: Some(-73.898),
                parent_station: Some("101".into()),
            },
            Station {
                stop_id: "103N".into(),
                name: Some("238 St".into()),
                lat: Some(40.884),
                lon: Some(-73.900),
                parent_station: Some("103".into()),
            },
        ])
    }

    fn make_stu(
        stop_id: &str,
        arrival_time: Option<i64>,
        schedule_relationship: Option<i32>,
    ) -> gtfs_realtime::trip_update::StopTimeUpdate {
        gtfs_realtime::trip_update::StopTimeUpdate {
            stop_id: Some(stop_id.to_string()),
            arrival: arrival_time.map(|t| gtfs_realtime::trip_update::StopTimeEvent {
                time: Some(t),
                delay: Some(30),
                ..Default::default()
            }),
            schedule_relationship,
            ..Default::default()
        }
    }

    fn make_entity(
        id: &str,
        trip_id: &str,
        route_id: &str,
        stus: Vec<gtfs_realtime::trip_update::StopTimeUpdate>,
    ) -> gtfs_realtime::FeedEntity {
        gtfs_realtime::FeedEntity {
            id: id.to_string(),
            trip_update: Some(gtfs_realtime::TripUpdate {
                trip: gtfs_realtime::TripDescriptor {
                    trip_id: Some(trip_id.to_string()),
                    route_id: Some(route_id.to_string()),
                    start_date: Some("20260830".to_string()),
                    ..Default::default()
                },
                stop_time_update: stus,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn make_feed(entities: Vec<gtfs_realtime::FeedEntity>) -> gtfs_realtime::FeedMessage {
        gtfs_realtime::FeedMessage {
            header: gtfs_realtime::FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1_700_000_000),
                ..Default::default()
            },
            entity: entities,
        }
    }

    #[test]
    fn normalize_resolves_stop_names_and_keeps_order() {
        let registry = make_registry();
        let feed = make_feed(vec![make_entity(
            "e1",
            "000600_1..N03R",
            "1",
            vec![
                make_stu("101N", Some(1_700_000_100), None),
                make_stu("103N", Some(1_700_000_400), None),
            ],
        )]);

        let entities = normalize_feed(&feed, &registry);
        assert_eq!(entities.len(), 1);
        let entity = &entities[0];
        assert_eq!(entity.trip_id, "000600_1..N03R");
        assert_eq!(entity.route_id, "1");
        assert_eq!(entity.start_date.as_deref(), Some("20260830"));
        assert_eq!(entity.stop_updates.len(), 2);
        assert_eq!(entity.stop_updates[0].stop_id, "101N");
        assert_eq!(
            entity.stop_updates[0].stop_name.as_deref(),
            Some("Van Cortlandt Park-242 St")
        );
        assert_eq!(entity.stop_updates[1].stop_id, "103N");
        // feed header timestamp applies when the trip update has none
        assert_eq!(
            entity.timestamp,
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test]
    fn normalize_drops_entities_without_trip_update() {
        let registry = make_registry();
        let mut feed = make_feed(vec![make_entity("e1", "000600_1..N03R", "1", vec![])]);
        feed.entity.push(gtfs_realtime::FeedEntity {
            id: "alert-only".to_string(),
            ..Default::default()
        });

        let entities = normalize_feed(&feed, &registry);
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn normalize_carries_feed_delay_and_relationship() {
        let registry = make_registry();
        let feed = make_feed(vec![make_entity(
            "e1",
            "000600_1..N03R",
            "1",
            vec![make_stu("101N", Some(1_700_000_100), Some(1))],
        )]);

        let entities = normalize_feed(&feed, &registry);
        let su = &entities[0].stop_updates[0];
        assert_eq!(su.schedule_relationship, ScheduleRelationship::Skipped);
        assert_eq!(su.arrival.unwrap().delay, Some(30));
    }

    #[test]
    fn normalize_unknown_stop_has_no_name() {
        let registry = make_registry();
        let feed = make_feed(vec![make_entity(
            "e1",
            "000600_1..N03R",
            "1",
            vec![make_stu("999X", Some(1_700_000_100), None)],
        )]);

        let entities = normalize_feed(&feed, &registry);
        assert_eq!(entities[0].stop_updates[0].stop_name, None);
    }
}
