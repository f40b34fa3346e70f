//! Identifier parsing for schedule matching.
//!
//! The live feed reports short trip identifiers like `000600_1..S03R`, while
//! the static schedule uses fully-qualified ones like
//! `AFA24GEN-1038-Sunday-00_000600_1..S03R`. The helpers here bridge the two
//! conventions and derive the shape and direction tokens used by the
//! fallback tiers. Each tier exposes its candidate keys as an explicit
//! ordered list so the probe order stays auditable.

use crate::stations::base_stop_id;

/// Extract the live-feed-style suffix from a trip id: the portion starting
/// at a six-digit origin-time segment followed by a shape token.
/// `AFA24GEN-1038-Sunday-00_000600_1..S03R` -> `000600_1..S03R`.
/// Ids already in suffix form return themselves.
pub fn trip_id_suffix(trip_id: &str) -> Option<&str> {
    let mut start = 0;
    loop {
        let candidate = &trip_id[start..];
        if is_suffix_form(candidate) {
            return Some(candidate);
        }
        match candidate.find('_') {
            Some(i) => start += i + 1,
            None => return None,
        }
    }
}

fn is_suffix_form(s: &str) -> bool {
    match s.split_once('_') {
        Some((head, tail)) => {
            head.len() == 6 && head.bytes().all(|b| b.is_ascii_digit()) && !tail.is_empty()
        }
        None => false,
    }
}

/// Shape token of a trip id: `000600_1..S03R` -> `1..S03R`. Works on both
/// fully-qualified and live-feed forms.
pub fn shape_token(trip_id: &str) -> Option<&str> {
    if let Some(suffix) = trip_id_suffix(trip_id) {
        if let Some((_, shape)) = suffix.split_once('_') {
            if !shape.is_empty() {
                return Some(shape);
            }
        }
    }
    // some schedules carry the shape as the last underscore segment without
    // an origin-time prefix
    trip_id.rsplit('_').next().filter(|s| s.contains(".."))
}

/// Direction token parsed from a shape: `1..S03R` -> `S`.
pub fn direction_token(shape: &str) -> Option<char> {
    let (_, rest) = shape.split_once("..")?;
    rest.chars().next().filter(|c| c.is_ascii_uppercase())
}

pub fn tier1_key(trip_id: &str, stop_id: &str) -> String {
    format!("{trip_id}:{stop_id}")
}

pub fn tier2_key(route_id: &str, shape: &str, stop_id: &str) -> String {
    format!("{route_id}:{shape}:{stop_id}")
}

pub fn tier3_key(route_id: &str, direction: char, stop_id: &str) -> String {
    format!("{route_id}:{direction}:{stop_id}")
}

/// Ordered Tier-1 candidates: original/base stop id crossed with
/// original/suffix-extracted trip id, most specific first.
pub fn tier1_candidates(trip_id: &str, stop_id: &str) -> Vec<String> {
    let base = base_stop_id(stop_id);
    let mut keys = vec![tier1_key(trip_id, stop_id)];
    if base != stop_id {
        keys.push(tier1_key(trip_id, base));
    }
    if let Some(suffix) = trip_id_suffix(trip_id) {
        if suffix != trip_id {
            keys.push(tier1_key(suffix, stop_id));
            if base != stop_id {
                keys.push(tier1_key(suffix, base));
            }
        }
    }
    keys
}

/// Ordered Tier-2 candidates: route + shape + both stop id forms. Empty when
/// no shape token can be extracted from the trip id.
pub fn tier2_candidates(route_id: &str, trip_id: &str, stop_id: &str) -> Vec<String> {
    let Some(shape) = shape_token(trip_id) else {
        return Vec::new();
    };
    let base = base_stop_id(stop_id);
    let mut keys = vec![tier2_key(route_id, shape, stop_id)];
    if base != stop_id {
        keys.push(tier2_key(route_id, shape, base));
    }
    keys
}

/// Ordered Tier-3 candidates: route + direction + both stop id forms. Empty
/// when no direction token can be derived.
pub fn tier3_candidates(route_id: &str, trip_id: &str, stop_id: &str) -> Vec<String> {
    let Some(direction) = shape_token(trip_id).and_then(direction_token) else {
        return Vec::new();
    };
    let base = base_stop_id(stop_id);
    let mut keys = vec![tier3_key(route_id, direction, stop_id)];
    if base != stop_id {
        keys.push(tier3_key(route_id, direction, base));
    }
    keys
}
