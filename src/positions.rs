//! Vehicle position interpolation.
//!
//! A trip's position is estimated by blending the coordinates of the last
//! departed stop and the next predicted stop by elapsed time. The blend is a
//! plain linear interpolation in lat/lon space, not great-circle: stop
//! spacing in this network is short relative to Earth's radius, so the
//! planar error is far below GPS noise. That assumption does not hold for
//! long-haul networks.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::feed::types::{FeedEntity, StopUpdate};
use crate::stations::StationRegistry;

/// An estimated position for one active trip. Recomputed from the latest
/// feed on every pass; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainPosition {
    pub trip_id: String,
    pub route_id: String,
    pub lat: f64,
    pub lon: f64,
    /// Forward azimuth from the previous to the next stop, degrees [0, 360).
    pub heading: f64,
    pub next_stop_id: String,
    pub next_stop_name: Option<String>,
    /// The feed's own predicted arrival at the next stop, unmodified.
    pub eta: DateTime<Utc>,
}

/// Estimate one position per trip that currently has a well-defined segment.
///
/// Pure: no I/O, inputs are not mutated. Trips with fewer than two stop
/// updates, no upcoming stop, unknown stop coordinates, or a non-positive
/// segment duration contribute nothing.
pub fn train_positions(
    entities: &[FeedEntity],
    stations: &StationRegistry,
    now: DateTime<Utc>,
) -> Vec<TrainPosition> {
    entities
        .iter()
        .filter_map(|entity| position_for_entity(entity, stations, now))
        .collect()
}

fn position_for_entity(
    entity: &FeedEntity,
    stations: &StationRegistry,
    now: DateTime<Utc>,
) -> Option<TrainPosition> {
    if entity.stop_updates.len() < 2 {
        return None;
    }

    // First stop whose predicted arrival is still ahead of `now`; the stop
    // before it in sequence is where the vehicle last departed.
    let next_idx = entity
        .stop_updates
        .iter()
        .position(|su| arrival_time(su).is_some_and(|t| t > now))?;
    if next_idx == 0 {
        return None;
    }
    let prev = &entity.stop_updates[next_idx - 1];
    let next = &entity.stop_updates[next_idx];

    let (prev_lat, prev_lon) = stations.coordinates(&prev.stop_id)?;
    let (next_lat, next_lon) = stations.coordinates(&next.stop_id)?;

    let prev_time = departure_time(prev).or_else(|| arrival_time(prev))?;
    let next_time = arrival_time(next)?;
    if next_time <= prev_time {
        return None;
    }

    let fraction = progress_fraction(now, prev_time, next_time);
    Some(TrainPosition {
        trip_id: entity.trip_id.clone(),
        route_id: entity.route_id.clone(),
        lat: prev_lat + (next_lat - prev_lat) * fraction,
        lon: prev_lon + (next_lon - prev_lon) * fraction,
        heading: bearing_degrees(prev_lat, prev_lon, next_lat, next_lon),
        next_stop_id: next.stop_id.clone(),
        next_stop_name: next.stop_name.clone(),
        eta: next_time,
    })
}

fn arrival_time(su: &StopUpdate) -> Option<DateTime<Utc>> {
    su.arrival.as_ref().and_then(|a| a.time)
}

fn departure_time(su: &StopUpdate) -> Option<DateTime<Utc>> {
    su.departure.as_ref().and_then(|d| d.time)
}

/// Elapsed fraction of the prev->next segment, clamped to [0, 1].
fn progress_fraction(
    now: DateTime<Utc>,
    prev_time: DateTime<Utc>,
    next_time: DateTime<Utc>,
) -> f64 {
    let elapsed = (now - prev_time).num_milliseconds() as f64;
    let total = (next_time - prev_time).num_milliseconds() as f64;
    (elapsed / total).clamp(0.0, 1.0)
}

/// Initial bearing from the first coordinate to the second, in degrees
/// normalized to [0, 360).
fn bearing_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let y = d_lon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lon.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}
