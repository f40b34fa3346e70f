//! Three-tier schedule index: build, snapshot, and the row types.
//!
//! The index maps live trip/stop identifier combinations to scheduled
//! stop events, built once from trips.txt and stop_times.txt. Tier 1 is the
//! exact trip:stop key (with the live-feed suffix form as an alternate
//! spelling), Tier 2 falls back to route:shape:stop, Tier 3 to
//! route:direction:stop.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::keys;
use crate::error::EngineError;

/// Bump when the on-disk layout changes; mismatched snapshots are rebuilt.
pub const SNAPSHOT_VERSION: u32 = 2;

/// One static scheduled stop event. Minutes are service-day relative and may
/// exceed 1440 for trips crossing midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub arrival_minutes: u32,
    pub departure_minutes: u32,
    pub stop_sequence: u32,
}

/// The built index. Read-only after construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleIndex {
    pub version: u32,
    /// Tier 1: `trip:stop`, keyed by both the full and suffix trip id forms.
    pub by_trip: HashMap<String, ScheduleEntry>,
    /// Tier 2: `route:shape:stop`.
    pub by_shape: HashMap<String, ScheduleEntry>,
    /// Tier 3: `route:direction:stop`; first write wins.
    pub by_direction: HashMap<String, ScheduleEntry>,
}

impl ScheduleIndex {
    pub fn entry_count(&self) -> usize {
        self.by_trip.len() + self.by_shape.len() + self.by_direction.len()
    }
}

/// A trips.txt row, reduced to what the index needs.
#[derive(Debug, Clone)]
pub struct TripRow {
    pub trip_id: String,
    pub route_id: String,
    pub shape_id: Option<String>,
}

/// A stop_times.txt row, reduced to what the index needs.
#[derive(Debug, Clone)]
pub struct StopTimeRow {
    pub trip_id: String,
    pub stop_id: String,
    pub arrival_minutes: u32,
    pub departure_minutes: u32,
    pub stop_sequence: u32,
}

/// Build the index from already-parsed tables.
pub fn build_from_tables(
    trips: &HashMap<String, TripRow>,
    stop_times: impl IntoIterator<Item = StopTimeRow>,
) -> ScheduleIndex {
    let mut index = ScheduleIndex {
        version: SNAPSHOT_VERSION,
        ..Default::default()
    };
    let mut orphaned = 0usize;

    for row in stop_times {
        let Some(trip) = trips.get(&row.trip_id) else {
            orphaned += 1;
            continue;
        };
        let entry = ScheduleEntry {
            arrival_minutes: row.arrival_minutes,
            departure_minutes: row.departure_minutes,
            stop_sequence: row.stop_sequence,
        };

        // Tier 1: the full static trip id, plus the live-feed suffix form so
        // realtime lookups hit without knowing the schedule's prefix.
        index
            .by_trip
            .insert(keys::tier1_key(&row.trip_id, &row.stop_id), entry);
        if let Some(suffix) = keys::trip_id_suffix(&row.trip_id) {
            if suffix != row.trip_id {
                index
                    .by_trip
                    .insert(keys::tier1_key(suffix, &row.stop_id), entry);
            }
        }

        // Tiers 2 and 3 need a shape: explicit shape_id when present,
        // otherwise parsed out of the trip id.
        let shape = trip
            .shape_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| keys::shape_token(&row.trip_id));
        if let Some(shape) = shape {
            index
                .by_shape
                .insert(keys::tier2_key(&trip.route_id, shape, &row.stop_id), entry);
            if let Some(direction) = keys::direction_token(shape) {
                index
                    .by_direction
                    .entry(keys::tier3_key(&trip.route_id, direction, &row.stop_id))
                    .or_insert(entry);
            }
        }
    }

    if orphaned > 0 {
        warn!(orphaned, "Skipped stop_times rows with no matching trip");
    }
    index
}

/// Build the index from the static schedule directory. Missing or unreadable
/// source files are fatal; there is no safe fallback for schedule lookups.
pub fn build_from_dir(static_dir: &Path) -> Result<ScheduleIndex, EngineError> {
    let trips = load_trips(static_dir)?;
    info!(trips = trips.len(), "Parsed schedule trips");

    let stop_times = load_stop_times(static_dir)?;
    info!(stop_times = stop_times.len(), "Parsed schedule stop times");

    let index = build_from_tables(&trips, stop_times);
    info!(
        tier1 = index.by_trip.len(),
        tier2 = index.by_shape.len(),
        tier3 = index.by_direction.len(),
        "Built schedule index"
    );
    Ok(index)
}

/// Load a previously serialized index. Returns None when the snapshot is
/// absent, unreadable, or from a different layout version.
pub fn load_snapshot(path: &Path) -> Option<ScheduleIndex> {
    let content = std::fs::read_to_string(path).ok()?;
    let index: ScheduleIndex = match serde_json::from_str(&content) {
        Ok(index) => index,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding unreadable index snapshot");
            return None;
        }
    };
    if index.version != SNAPSHOT_VERSION {
        debug!(
            found = index.version,
            expected = SNAPSHOT_VERSION,
            "Discarding index snapshot with stale version"
        );
        return None;
    }
    Some(index)
}

/// Persist the index for the next process. Best-effort: a failed write only
/// costs the next startup a rebuild.
pub fn save_snapshot(path: &Path, index: &ScheduleIndex) {
    let result = serde_json::to_string(index)
        .map_err(EngineError::from)
        .and_then(|json| std::fs::write(path, json).map_err(EngineError::from));
    match result {
        Ok(()) => info!(path = %path.display(), entries = index.entry_count(), "Wrote index snapshot"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to write index snapshot"),
    }
}

/// Parse a schedule time string `HH:MM:SS` into minutes since midnight.
/// Hours may exceed 24 for trips crossing midnight.
pub fn parse_schedule_minutes(time_str: &str) -> Option<u32> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: u32 = parts[0].trim().parse().ok()?;
    let minutes: u32 = parts[1].trim().parse().ok()?;
    let _seconds: u32 = parts[2].trim().parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}

fn load_trips(static_dir: &Path) -> Result<HashMap<String, TripRow>, EngineError> {
    let path = static_dir.join("trips.txt");
    let mut rdr = csv::Reader::from_path(&path)
        .map_err(|e| EngineError::ScheduleSource(format!("{}: {}", path.display(), e)))?;
    let headers = rdr.headers()?.clone();

    let idx_trip = headers
        .iter()
        .position(|h| h == "trip_id")
        .ok_or_else(|| EngineError::ScheduleSource("trips.txt missing trip_id".into()))?;
    let idx_route = headers
        .iter()
        .position(|h| h == "route_id")
        .ok_or_else(|| EngineError::ScheduleSource("trips.txt missing route_id".into()))?;
    let idx_shape = headers.iter().position(|h| h == "shape_id");

    let mut trips = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        if trip_id.is_empty() {
            continue;
        }
        trips.insert(
            trip_id.clone(),
            TripRow {
                trip_id,
                route_id: record.get(idx_route).unwrap_or("").to_string(),
                shape_id: idx_shape
                    .and_then(|i| record.get(i))
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string()),
            },
        );
    }
    Ok(trips)
}

fn load_stop_times(static_dir: &Path) -> Result<Vec<StopTimeRow>, EngineError> {
    let path = static_dir.join("stop_times.txt");
    let mut rdr = csv::Reader::from_path(&path)
        .map_err(|e| EngineError::ScheduleSource(format!("{}: {}", path.display(), e)))?;
    let headers = rdr.headers()?.clone();

    let idx_trip = headers
        .iter()
        .position(|h| h == "trip_id")
        .ok_or_else(|| EngineError::ScheduleSource("stop_times.txt missing trip_id".into()))?;
    let idx_stop = headers
        .iter()
        .position(|h| h == "stop_id")
        .ok_or_else(|| EngineError::ScheduleSource("stop_times.txt missing stop_id".into()))?;
    let idx_seq = headers
        .iter()
        .position(|h| h == "stop_sequence")
        .ok_or_else(|| EngineError::ScheduleSource("stop_times.txt missing stop_sequence".into()))?;
    let idx_arr = headers.iter().position(|h| h == "arrival_time");
    let idx_dep = headers.iter().position(|h| h == "departure_time");

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        let stop_id = record.get(idx_stop).unwrap_or("").to_string();
        if trip_id.is_empty() || stop_id.is_empty() {
            skipped += 1;
            continue;
        }
        let arrival = idx_arr
            .and_then(|i| record.get(i))
            .and_then(parse_schedule_minutes);
        let departure = idx_dep
            .and_then(|i| record.get(i))
            .and_then(parse_schedule_minutes);
        // a row with neither time contributes nothing to delay math
        let Some(arrival_minutes) = arrival.or(departure) else {
            skipped += 1;
            continue;
        };
        rows.push(StopTimeRow {
            trip_id,
            stop_id,
            arrival_minutes,
            departure_minutes: departure.unwrap_or(arrival_minutes),
            stop_sequence: record
                .get(idx_seq)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        });
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stop_times.txt records without usable times");
    }
    Ok(rows)
}
