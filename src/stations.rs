//! Static stop dictionary.
//!
//! Loads stops.txt from the extracted static schedule and answers
//! id -> name/coordinates/parent lookups for the decoder, the interpolator,
//! and the board builder.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Station {
    pub stop_id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub parent_station: Option<String>,
}

/// Read-only stop dictionary keyed by stop id.
#[derive(Debug)]
pub struct StationRegistry {
    stations: HashMap<String, Station>,
}

impl StationRegistry {
    /// Load stops.txt from the static schedule directory. A missing or
    /// unreadable file is fatal; there is no sensible fallback for the
    /// stop dictionary.
    pub fn load_dir(dir: &Path) -> Result<Self, EngineError> {
        let path = dir.join("stops.txt");
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| {
            EngineError::ScheduleSource(format!("{}: {}", path.display(), e))
        })?;
        let headers = rdr.headers()?.clone();

        let idx_id = headers
            .iter()
            .position(|h| h == "stop_id")
            .ok_or_else(|| EngineError::ScheduleSource("stops.txt missing stop_id".into()))?;
        let idx_name = headers.iter().position(|h| h == "stop_name");
        let idx_lat = headers.iter().position(|h| h == "stop_lat");
        let idx_lon = headers.iter().position(|h| h == "stop_lon");
        let idx_parent = headers.iter().position(|h| h == "parent_station");

        let mut stations = HashMap::new();
        let mut skipped = 0usize;
        for result in rdr.records() {
            let record = result?;
            let stop_id = record.get(idx_id).unwrap_or("").to_string();
            if stop_id.is_empty() {
                skipped += 1;
                continue;
            }
            stations.insert(
                stop_id.clone(),
                Station {
                    stop_id,
                    name: idx_name.and_then(|i| record.get(i)).and_then(non_empty),
                    lat: idx_lat
                        .and_then(|i| record.get(i))
                        .and_then(|s| s.parse().ok()),
                    lon: idx_lon
                        .and_then(|i| record.get(i))
                        .and_then(|s| s.parse().ok()),
                    parent_station: idx_parent.and_then(|i| record.get(i)).and_then(non_empty),
                },
            );
        }
        if skipped > 0 {
            warn!(skipped, "Skipped stops.txt records with empty stop_id");
        }
        info!(stations = stations.len(), "Loaded stop dictionary");

        Ok(Self { stations })
    }

    /// Build a registry from already-loaded stations (callers that bring
    /// their own reference-data loader).
    pub fn from_stations(stations: impl IntoIterator<Item = Station>) -> Self {
        Self {
            stations: stations
                .into_iter()
                .map(|s| (s.stop_id.clone(), s))
                .collect(),
        }
    }

    pub fn get(&self, stop_id: &str) -> Option<&Station> {
        self.stations.get(stop_id)
    }

    /// Stop name for an id, falling back to the direction-stripped parent id
    /// when the platform-level id is not listed.
    pub fn name(&self, stop_id: &str) -> Option<String> {
        self.lookup(stop_id).and_then(|s| s.name.clone())
    }

    /// Coordinates for an id, with the same parent fallback as `name`.
    pub fn coordinates(&self, stop_id: &str) -> Option<(f64, f64)> {
        let station = self.lookup(stop_id)?;
        Some((station.lat?, station.lon?))
    }

    fn lookup(&self, stop_id: &str) -> Option<&Station> {
        if let Some(station) = self.stations.get(stop_id) {
            return Some(station);
        }
        let base = base_stop_id(stop_id);
        if base != stop_id {
            return self.stations.get(base);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

/// Strip a trailing direction suffix from a platform-level stop id:
/// `"101N"` -> `"101"`. Ids without a suffix pass through unchanged.
pub fn base_stop_id(stop_id: &str) -> &str {
    stop_id
        .strip_suffix('N')
        .or_else(|| stop_id.strip_suffix('S'))
        .unwrap_or(stop_id)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_registry() -> StationRegistry {
        StationRegistry::from_stations(vec![
            Station {
                stop_id: "101".into(),
                name: Some("Van Cortlandt Park-242 St".into()),
                lat: Some(40.889248),
                lon: Some(-73.898583),
                parent_station: None,
            },
            Station {
                stop_id: "101N".into(),
                name: Some("Van Cortlandt Park-242 St".into()),
                lat: Some(40.889248),
                lon: Some(-73.898583),
                parent_station: Some("101".into()),
            },
        ])
    }

    #[test]
    fn base_stop_id_strips_direction_suffix() {
        assert_eq!(base_stop_id("101N"), "101");
        assert_eq!(base_stop_id("237S"), "237");
        assert_eq!(base_stop_id("101"), "101");
        assert_eq!(base_stop_id(""), "");
    }

    #[test]
    fn lookup_falls_back_to_base_id() {
        let registry = make_registry();
        // "103S" is unknown, and so is its base
        assert_eq!(registry.coordinates("103S"), None);
        // "101S" is unknown, but "101" resolves
        let (lat, lon) = registry.coordinates("101S").unwrap();
        assert!((lat - 40.889248).abs() < 1e-9);
        assert!((lon + 73.898583).abs() < 1e-9);
        assert_eq!(
            registry.name("101S").as_deref(),
            Some("Van Cortlandt Park-242 St")
        );
    }

    #[test]
    fn load_dir_parses_stops_txt() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("stops.txt")).unwrap();
        writeln!(f, "stop_id,stop_name,stop_lat,stop_lon,parent_station").unwrap();
        writeln!(f, "101,Van Cortlandt Park-242 St,40.889248,-73.898583,").unwrap();
        writeln!(f, "101N,Van Cortlandt Park-242 St,40.889248,-73.898583,101").unwrap();
        writeln!(f, ",bogus,1.0,1.0,").unwrap();
        drop(f);

        let registry = StationRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("101N").unwrap().parent_station.as_deref(),
            Some("101")
        );
    }

    #[test]
    fn load_dir_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = StationRegistry::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::ScheduleSource(_)));
    }
}
