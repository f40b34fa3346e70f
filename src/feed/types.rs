//! Normalized domain records decoded from the realtime feed.
//!
//! A decode pass produces a fresh `Vec<FeedEntity>` that replaces the
//! previous one wholesale; nothing here is mutated after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relationship of a predicted stop event to the static schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleRelationship {
    Scheduled,
    Skipped,
    NoData,
    Unscheduled,
}

impl ScheduleRelationship {
    /// Decode the GTFS-RT enum value; anything unknown is treated as scheduled.
    pub fn from_gtfs(value: Option<i32>) -> Self {
        match value {
            Some(1) => ScheduleRelationship::Skipped,
            Some(2) => ScheduleRelationship::NoData,
            Some(3) => ScheduleRelationship::Unscheduled,
            _ => ScheduleRelationship::Scheduled,
        }
    }
}

/// A predicted arrival or departure instant, with the feed's own delay
/// estimate when it carries one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopTimeInfo {
    /// Predicted event time (ISO-8601 when serialized).
    pub time: Option<DateTime<Utc>>,
    /// Feed-reported delay in seconds.
    pub delay: Option<i32>,
}

/// A single predicted event at a stop within a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopUpdate {
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub arrival: Option<StopTimeInfo>,
    pub departure: Option<StopTimeInfo>,
    pub schedule_relationship: ScheduleRelationship,
}

/// One active trip as reported by the realtime feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntity {
    pub route_id: String,
    pub trip_id: String,
    /// Service date in `YYYYMMDD` form, when the feed reports one.
    pub start_date: Option<String>,
    pub vehicle_id: Option<String>,
    /// The trip's remaining path; sequence order is significant.
    pub stop_updates: Vec<StopUpdate>,
    /// Feed publish time.
    pub timestamp: Option<DateTime<Utc>>,
}
