//! Schedule delay resolution.
//!
//! Matches a live trip/stop pair against the three-tier schedule index and
//! computes delay as predicted minus scheduled time, in seconds. The index
//! is built once, lazily, behind a single-flight guard: when N callers race
//! the first lookup, exactly one build runs and the rest await it.

pub mod index;
pub mod keys;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::EngineError;
use index::{ScheduleEntry, ScheduleIndex};

/// Which tier produced a schedule match. Ordered by confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    ShapeFallback,
    DirectionFallback,
}

/// One arrival to resolve in a batch.
#[derive(Debug, Clone)]
pub struct DelayRequest {
    pub trip_id: String,
    pub stop_id: String,
    pub predicted_arrival: DateTime<Utc>,
    pub route_id: Option<String>,
}

type IndexLoader = Arc<dyn Fn() -> Result<ScheduleIndex, EngineError> + Send + Sync>;

/// Owns the lazily-built schedule index and answers delay queries.
pub struct DelayResolver {
    loader: IndexLoader,
    snapshot_path: Option<PathBuf>,
    timezone: Tz,
    cell: OnceCell<ScheduleIndex>,
}

impl DelayResolver {
    /// Resolver backed by the static schedule directory.
    pub fn new(static_dir: PathBuf, snapshot_path: Option<PathBuf>, timezone: Tz) -> Self {
        Self::with_loader(
            move || index::build_from_dir(&static_dir),
            snapshot_path,
            timezone,
        )
    }

    /// Resolver with an injected index source; the seam that makes the
    /// single-flight guard observable in tests.
    pub fn with_loader(
        loader: impl Fn() -> Result<ScheduleIndex, EngineError> + Send + Sync + 'static,
        snapshot_path: Option<PathBuf>,
        timezone: Tz,
    ) -> Self {
        Self {
            loader: Arc::new(loader),
            snapshot_path,
            timezone,
            cell: OnceCell::new(),
        }
    }

    /// The index, building it on first use. A failed build is surfaced to
    /// every waiter and retried on the next call.
    async fn index(&self) -> Result<&ScheduleIndex, EngineError> {
        self.cell
            .get_or_try_init(|| async {
                if let Some(path) = &self.snapshot_path {
                    if let Some(snapshot) = index::load_snapshot(path) {
                        info!(entries = snapshot.entry_count(), "Loaded schedule index snapshot");
                        return Ok(snapshot);
                    }
                }
                let loader = self.loader.clone();
                let built = tokio::task::spawn_blocking(move || loader()).await??;
                if let Some(path) = &self.snapshot_path {
                    index::save_snapshot(path, &built);
                }
                Ok(built)
            })
            .await
    }

    /// Delay in seconds (positive = late) plus the tier that matched, or
    /// None when no tier has an entry for this trip/stop.
    pub async fn resolve(
        &self,
        trip_id: &str,
        stop_id: &str,
        predicted_arrival: DateTime<Utc>,
        route_id: Option<&str>,
    ) -> Result<Option<(i64, MatchTier)>, EngineError> {
        let index = self.index().await?;
        Ok(lookup(index, trip_id, stop_id, route_id).and_then(|(entry, tier)| {
            delay_seconds(&entry, predicted_arrival, self.timezone).map(|d| (d, tier))
        }))
    }

    /// Delay in seconds without the tier tag. A miss is a normal outcome,
    /// not an error.
    pub async fn calculate_delay(
        &self,
        trip_id: &str,
        stop_id: &str,
        predicted_arrival: DateTime<Utc>,
        route_id: Option<&str>,
    ) -> Result<Option<i64>, EngineError> {
        Ok(self
            .resolve(trip_id, stop_id, predicted_arrival, route_id)
            .await?
            .map(|(delay, _)| delay))
    }

    /// Resolve each request independently; the result maps input index to
    /// delay and simply omits unmatched entries.
    pub async fn calculate_delays_batch(
        &self,
        requests: &[DelayRequest],
    ) -> Result<HashMap<usize, i64>, EngineError> {
        let index = self.index().await?;
        let mut delays = HashMap::new();
        for (i, req) in requests.iter().enumerate() {
            let matched = lookup(index, &req.trip_id, &req.stop_id, req.route_id.as_deref())
                .and_then(|(entry, _)| {
                    delay_seconds(&entry, req.predicted_arrival, self.timezone)
                });
            if let Some(delay) = matched {
                delays.insert(i, delay);
            }
        }
        Ok(delays)
    }

    /// Drop the built index so the next lookup rebuilds.
    pub fn invalidate(&mut self) {
        self.cell.take();
    }

    /// Whether the index has been built (or snapshot-loaded) yet.
    pub fn is_built(&self) -> bool {
        self.cell.initialized()
    }
}

/// Probe the tiers in confidence order. A lower tier is consulted only when
/// every candidate key in the tiers above missed; tiers 2 and 3 need a
/// route id to form their keys at all.
pub fn lookup(
    index: &ScheduleIndex,
    trip_id: &str,
    stop_id: &str,
    route_id: Option<&str>,
) -> Option<(ScheduleEntry, MatchTier)> {
    for key in keys::tier1_candidates(trip_id, stop_id) {
        if let Some(entry) = index.by_trip.get(&key) {
            return Some((*entry, MatchTier::Exact));
        }
    }

    let route_id = route_id?;
    for key in keys::tier2_candidates(route_id, trip_id, stop_id) {
        if let Some(entry) = index.by_shape.get(&key) {
            return Some((*entry, MatchTier::ShapeFallback));
        }
    }
    for key in keys::tier3_candidates(route_id, trip_id, stop_id) {
        if let Some(entry) = index.by_direction.get(&key) {
            return Some((*entry, MatchTier::DirectionFallback));
        }
    }
    None
}

/// Seconds between the prediction and the scheduled instant, positive when
/// late. The scheduled instant is the prediction's service-day midnight (in
/// the schedule's timezone) plus the entry's arrival minutes; predictions
/// and schedule rows are assumed to share a service day, with post-midnight
/// rows carrying minutes >= 1440. Returns None only when local midnight
/// cannot be mapped (pathological DST edge).
fn delay_seconds(entry: &ScheduleEntry, predicted: DateTime<Utc>, tz: Tz) -> Option<i64> {
    let service_date = predicted.with_timezone(&tz).date_naive();
    let midnight = service_date.and_hms_opt(0, 0, 0)?;
    let scheduled_local = midnight + Duration::minutes(entry.arrival_minutes as i64);
    let scheduled = tz
        .from_local_datetime(&scheduled_local)
        .earliest()?
        .with_timezone(&Utc);
    Some((((predicted - scheduled).num_milliseconds()) as f64 / 1000.0).round() as i64)
}
