// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Heart-rate zones and the zone classifier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Heart-rate zone, ranked from lowest to highest intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Z1,
    Z2,
    Z3,
    Z4,
}

impl Zone {
    /// All zones in classification priority order
    pub const ALL: [Zone; 4] = [Zone::Z1, Zone::Z2, Zone::Z3, Zone::Z4];

    pub fn index(self) -> usize {
        match self {
            Zone::Z1 => 0,
            Zone::Z2 => 1,
            Zone::Z3 => 2,
            Zone::Z4 => 3,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Z{}", self.index() + 1)
    }
}

/// Inclusive `[min, max]` bpm range, stored as a two-element array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u16; 2]", into = "[u16; 2]")]
pub struct ZoneRange {
    pub min: u16,
    pub max: u16,
}

impl ZoneRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, bpm: u16) -> bool {
        bpm >= self.min && bpm <= self.max
    }
}

impl From<[u16; 2]> for ZoneRange {
    fn from([min, max]: [u16; 2]) -> Self {
        Self { min, max }
    }
}

impl From<ZoneRange> for [u16; 2] {
    fn from(range: ZoneRange) -> Self {
        [range.min, range.max]
    }
}

/// Per-athlete boundaries for zones z1..z4.
///
/// Ranges need not be contiguous and may overlap; overlaps resolve to the
/// lowest zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBoundaries {
    pub z1: ZoneRange,
    pub z2: ZoneRange,
    pub z3: ZoneRange,
    pub z4: ZoneRange,
}

impl Default for ZoneBoundaries {
    fn default() -> Self {
        Self {
            z1: ZoneRange::new(90, 120),
            z2: ZoneRange::new(121, 140),
            z3: ZoneRange::new(141, 160),
            z4: ZoneRange::new(161, 190),
        }
    }
}

impl ZoneBoundaries {
    pub fn range(&self, zone: Zone) -> ZoneRange {
        match zone {
            Zone::Z1 => self.z1,
            Zone::Z2 => self.z2,
            Zone::Z3 => self.z3,
            Zone::Z4 => self.z4,
        }
    }

    /// Classify a sample against these boundaries
    pub fn classify(&self, bpm: u16) -> Option<Zone> {
        classify(bpm, self)
    }
}

/// Return the first zone in z1..z4 whose inclusive range contains `bpm`,
/// or `None` when no zone matches.
pub fn classify(bpm: u16, boundaries: &ZoneBoundaries) -> Option<Zone> {
    Zone::ALL
        .into_iter()
        .find(|&zone| boundaries.range(zone).contains(bpm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_inclusive_bounds() {
        let zb = ZoneBoundaries::default();
        assert_eq!(classify(90, &zb), Some(Zone::Z1));
        assert_eq!(classify(120, &zb), Some(Zone::Z1));
        assert_eq!(classify(121, &zb), Some(Zone::Z2));
        assert_eq!(classify(160, &zb), Some(Zone::Z3));
        assert_eq!(classify(190, &zb), Some(Zone::Z4));
    }

    #[test]
    fn test_classify_no_zone() {
        let zb = ZoneBoundaries::default();
        assert_eq!(classify(0, &zb), None);
        assert_eq!(classify(89, &zb), None);
        assert_eq!(classify(191, &zb), None);
    }

    #[test]
    fn test_overlap_lowest_zone_wins() {
        let zb = ZoneBoundaries {
            z1: ZoneRange::new(100, 150),
            z2: ZoneRange::new(120, 160),
            z3: ZoneRange::new(100, 200),
            z4: ZoneRange::new(0, 255),
        };
        assert_eq!(classify(130, &zb), Some(Zone::Z1));
        assert_eq!(classify(155, &zb), Some(Zone::Z2));
        assert_eq!(classify(170, &zb), Some(Zone::Z3));
        assert_eq!(classify(10, &zb), Some(Zone::Z4));
    }

    #[test]
    fn test_classify_matches_lowest_index_exhaustively() {
        let zb = ZoneBoundaries {
            z1: ZoneRange::new(50, 60),
            z2: ZoneRange::new(55, 70),
            z3: ZoneRange::new(80, 90),
            z4: ZoneRange::new(65, 85),
        };
        for bpm in 0..=300u16 {
            let expected = Zone::ALL.into_iter().find(|&z| {
                let r = zb.range(z);
                bpm >= r.min && bpm <= r.max
            });
            assert_eq!(classify(bpm, &zb), expected, "bpm {}", bpm);
        }
    }

    #[test]
    fn test_boundaries_serialize_as_pairs() {
        let json = serde_json::to_value(ZoneBoundaries::default()).unwrap();
        assert_eq!(json["z1"], serde_json::json!([90, 120]));
        assert_eq!(json["z4"], serde_json::json!([161, 190]));
    }
}
