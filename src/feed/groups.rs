//! Feed-group partitions of the realtime feed.
//!
//! The upstream publishes one protobuf feed per group of routes; each group
//! is fetched and cached independently so one group's outage never blocks
//! the others.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// One named partition of the realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedGroup {
    /// Numbered routes 1-7 plus the shuttles.
    Main,
    Ace,
    Bdfm,
    G,
    Jz,
    Nqrw,
    L,
    Si,
}

impl FeedGroup {
    /// Every known feed group, in fetch order.
    pub const ALL: [FeedGroup; 8] = [
        FeedGroup::Main,
        FeedGroup::Ace,
        FeedGroup::Bdfm,
        FeedGroup::G,
        FeedGroup::Jz,
        FeedGroup::Nqrw,
        FeedGroup::L,
        FeedGroup::Si,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedGroup::Main => "main",
            FeedGroup::Ace => "ace",
            FeedGroup::Bdfm => "bdfm",
            FeedGroup::G => "g",
            FeedGroup::Jz => "jz",
            FeedGroup::Nqrw => "nqrw",
            FeedGroup::L => "l",
            FeedGroup::Si => "si",
        }
    }

    /// Upstream URL suffix appended to the configured base URL.
    fn url_suffix(&self) -> &'static str {
        match self {
            FeedGroup::Main => "",
            FeedGroup::Ace => "-ace",
            FeedGroup::Bdfm => "-bdfm",
            FeedGroup::G => "-g",
            FeedGroup::Jz => "-jz",
            FeedGroup::Nqrw => "-nqrw",
            FeedGroup::L => "-l",
            FeedGroup::Si => "-si",
        }
    }

    /// Full upstream URL for this group.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url, self.url_suffix())
    }

    /// The group that carries a given route.
    pub fn for_route(route: &str) -> Option<FeedGroup> {
        match route {
            "1" | "2" | "3" | "4" | "5" | "6" | "7" | "GS" | "S" => Some(FeedGroup::Main),
            "A" | "C" | "E" | "H" | "FS" => Some(FeedGroup::Ace),
            "B" | "D" | "F" | "M" => Some(FeedGroup::Bdfm),
            "G" => Some(FeedGroup::G),
            "J" | "Z" => Some(FeedGroup::Jz),
            "N" | "Q" | "R" | "W" => Some(FeedGroup::Nqrw),
            "L" => Some(FeedGroup::L),
            "SI" | "SIR" => Some(FeedGroup::Si),
            _ => None,
        }
    }
}

impl fmt::Display for FeedGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedGroup {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeedGroup::ALL
            .iter()
            .find(|g| g.as_str() == s)
            .copied()
            .ok_or_else(|| EngineError::UnknownFeedGroup(s.to_string()))
    }
}
