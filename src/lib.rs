//! Realtime subway feed engine.
//!
//! Fetches and decodes GTFS-Realtime protobuf feeds for the eight NYC
//! subway feed groups, normalizes them into plain entity structs, and
//! derives the products downstream consumers want: interpolated train
//! positions, schedule-delay measurements via a lazily-built three-tier
//! schedule index, and per-stop arrival boards. Decoded feeds and boards
//! are cached behind a pluggable short-TTL cache so bursts of requests
//! collapse onto one upstream fetch.
//!
//! [`Engine`] is the entry point; construct it from a [`Config`] and a
//! [`StationRegistry`] and attach a [`CacheStore`] if you have one.

pub mod board;
pub mod cache;
pub mod config;
pub mod delay;
pub mod engine;
pub mod error;
pub mod feed;
pub mod positions;
pub mod stations;

pub use board::{ArrivalBoard, ArrivalItem};
pub use cache::{CacheStore, MemoryCache};
pub use config::Config;
pub use delay::{DelayRequest, DelayResolver, MatchTier};
pub use engine::Engine;
pub use error::EngineError;
pub use feed::groups::FeedGroup;
pub use feed::types::{FeedEntity, ScheduleRelationship, StopTimeInfo, StopUpdate};
pub use positions::TrainPosition;
pub use stations::{base_stop_id, Station, StationRegistry};
