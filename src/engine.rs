//! The engine facade: one handle owning the HTTP client, the optional
//! cache, and the delay resolver, exposing the high-level operations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::board::{self, ArrivalBoard, GroupArrivals};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::delay::{DelayRequest, DelayResolver, MatchTier};
use crate::error::EngineError;
use crate::feed::groups::FeedGroup;
use crate::feed::types::FeedEntity;
use crate::feed::{fetch_feed_message, normalize_feed};
use crate::positions::{train_positions, TrainPosition};
use crate::stations::StationRegistry;

const USER_AGENT: &str = concat!("subway-engine/", env!("CARGO_PKG_VERSION"));

pub struct Engine {
    client: reqwest::Client,
    config: Config,
    timezone: Tz,
    stations: Arc<StationRegistry>,
    cache: Option<Arc<dyn CacheStore>>,
    delays: DelayResolver,
}

impl Engine {
    pub fn new(config: Config, stations: Arc<StationRegistry>) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        let timezone = config.parsed_timezone();
        let delays = DelayResolver::new(
            std::path::PathBuf::from(&config.static_dir),
            config.index_snapshot_path.as_ref().map(std::path::PathBuf::from),
            timezone,
        );
        Ok(Self {
            client,
            config,
            timezone,
            stations,
            cache: None,
            delays,
        })
    }

    /// Attach a cache backend. Without one every fetch goes upstream.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    fn cache_get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.cache.as_ref()?.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    fn cache_put<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        match serde_json::to_value(value) {
            Ok(json) => cache.set(key, json, ttl),
            Err(e) => debug!(key, error = %e, "Skipping cache write"),
        }
    }

    /// Fetch and normalize one feed group, consulting the cache first when
    /// asked. A cache hit never touches the network.
    pub async fn fetch_feed(
        &self,
        group: FeedGroup,
        use_cache: bool,
    ) -> Result<Vec<FeedEntity>, EngineError> {
        let cache_key = format!("feed:{group}");
        if use_cache {
            if let Some(entities) = self.cache_get::<Vec<FeedEntity>>(&cache_key) {
                debug!(%group, "Serving feed from cache");
                return Ok(entities);
            }
        }

        let url = group.url(&self.config.feed_base_url);
        let message = fetch_feed_message(
            &self.client,
            &url,
            self.config.api_key.as_deref(),
            Duration::from_secs(self.config.fetch_timeout_secs),
        )
        .await?;
        let entities = normalize_feed(&message, &self.stations);
        debug!(%group, entities = entities.len(), "Fetched feed");

        self.cache_put(
            &cache_key,
            &entities,
            Duration::from_secs(self.config.feed_cache_ttl_secs),
        );
        Ok(entities)
    }

    /// Fetch every feed group concurrently. Groups that fail are logged and
    /// skipped so one broken partition does not blank the whole system.
    pub async fn fetch_all_feeds(&self, use_cache: bool) -> Vec<FeedEntity> {
        let fetches = FeedGroup::ALL
            .iter()
            .map(|&group| async move { (group, self.fetch_feed(group, use_cache).await) });

        let mut entities = Vec::new();
        for (group, result) in join_all(fetches).await {
            match result {
                Ok(mut batch) => entities.append(&mut batch),
                Err(e) => warn!(%group, error = %e, "Skipping feed group"),
            }
        }
        entities
    }

    /// Interpolated positions for every in-motion train in the entities.
    pub fn train_positions(
        &self,
        entities: &[FeedEntity],
        now: DateTime<Utc>,
    ) -> Vec<TrainPosition> {
        train_positions(entities, &self.stations, now)
    }

    /// Schedule delay in seconds for one predicted arrival, positive when
    /// late. None when the schedule has no usable match.
    pub async fn calculate_delay(
        &self,
        trip_id: &str,
        stop_id: &str,
        predicted_arrival: DateTime<Utc>,
        route_id: Option<&str>,
    ) -> Result<Option<i64>, EngineError> {
        self.delays
            .calculate_delay(trip_id, stop_id, predicted_arrival, route_id)
            .await
    }

    /// Delay plus the match tier that produced it.
    pub async fn resolve_delay(
        &self,
        trip_id: &str,
        stop_id: &str,
        predicted_arrival: DateTime<Utc>,
        route_id: Option<&str>,
    ) -> Result<Option<(i64, MatchTier)>, EngineError> {
        self.delays
            .resolve(trip_id, stop_id, predicted_arrival, route_id)
            .await
    }

    /// Delays for a batch of arrivals, keyed by input index; unmatched
    /// requests are simply absent from the map.
    pub async fn calculate_delays_batch(
        &self,
        requests: &[DelayRequest],
    ) -> Result<std::collections::HashMap<usize, i64>, EngineError> {
        self.delays.calculate_delays_batch(requests).await
    }

    /// Drop the schedule index so the next delay query rebuilds it, e.g.
    /// after a static schedule refresh.
    pub fn invalidate_schedule(&mut self) {
        self.delays.invalidate();
    }

    /// Arrival board for one stop. The whole group's boards are cached as a
    /// unit; the ETA text is recomputed for the caller's clock either way.
    pub async fn arrival_board(
        &self,
        group: FeedGroup,
        stop_id: &str,
        use_cache: bool,
    ) -> Result<ArrivalBoard, EngineError> {
        let now = Utc::now();
        let cache_key = format!("board:{group}");
        if use_cache {
            if let Some(arrivals) = self.cache_get::<GroupArrivals>(&cache_key) {
                debug!(%group, stop_id, "Serving board from cache");
                return Ok(board::board_for_stop(&arrivals, stop_id, now));
            }
        }

        let entities = self.fetch_feed(group, use_cache).await?;
        let arrivals = board::build_group_arrivals(&entities, self.timezone, now);
        self.cache_put(
            &cache_key,
            &arrivals,
            Duration::from_secs(self.config.board_cache_ttl_secs),
        );
        Ok(board::board_for_stop(&arrivals, stop_id, now))
    }
}
