use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Engine configuration, loadable from a YAML file.
///
/// Every field carries a sensible default so an empty document is a valid
/// config; only deployments with a non-standard upstream or schedule location
/// need to set anything.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL for the realtime feed; the feed-group suffix is appended.
    #[serde(default = "Config::default_feed_base_url")]
    pub feed_base_url: String,
    /// Optional API key sent as the `x-api-key` header on feed fetches.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Directory containing the extracted static schedule
    /// (stops.txt, trips.txt, stop_times.txt).
    #[serde(default = "Config::default_static_dir")]
    pub static_dir: String,
    /// Where to persist the serialized schedule-index snapshot. None disables
    /// snapshotting and every process rebuilds from the schedule source.
    #[serde(default)]
    pub index_snapshot_path: Option<String>,
    /// IANA timezone the schedule's service days are defined in.
    #[serde(default = "Config::default_timezone")]
    pub timezone: String,
    /// TTL for cached decoded feeds, tuned to the feed's refresh cadence.
    #[serde(default = "Config::default_feed_cache_ttl_secs")]
    pub feed_cache_ttl_secs: u64,
    /// TTL for cached per-group arrival boards.
    #[serde(default = "Config::default_board_cache_ttl_secs")]
    pub board_cache_ttl_secs: u64,
    /// Per-request timeout for feed fetches.
    #[serde(default = "Config::default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_base_url: Self::default_feed_base_url(),
            api_key: None,
            static_dir: Self::default_static_dir(),
            index_snapshot_path: None,
            timezone: Self::default_timezone(),
            feed_cache_ttl_secs: Self::default_feed_cache_ttl_secs(),
            board_cache_ttl_secs: Self::default_board_cache_ttl_secs(),
            fetch_timeout_secs: Self::default_fetch_timeout_secs(),
        }
    }
}

impl Config {
    fn default_feed_base_url() -> String {
        "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs".to_string()
    }
    fn default_static_dir() -> String {
        "gtfs-static".to_string()
    }
    fn default_timezone() -> String {
        "America/New_York".to_string()
    }
    fn default_feed_cache_ttl_secs() -> u64 {
        15
    }
    fn default_board_cache_ttl_secs() -> u64 {
        60
    }
    fn default_fetch_timeout_secs() -> u64 {
        15
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse the configured timezone, falling back to the default when the
    /// name is unknown. A typo'd timezone should not brick the engine.
    pub fn parsed_timezone(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            warn!(timezone = %self.timezone, "Unknown timezone, falling back to America/New_York");
            chrono_tz::America::New_York
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
