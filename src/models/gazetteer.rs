//! Authoritative populated-place observations.

use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// GeoNames feature class for cities, towns, villages
pub const POPULATED_PLACE_CLASS: &str = "P";

/// One line of the gazetteer dump. Read-only, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazetteerEntry {
    pub location: GeoPoint,
    /// Uppercase ISO country code
    pub country: String,
    pub feature_class: String,
    /// 0 when the dump leaves the field empty
    pub population: u64,
    /// Coarse DEM elevation (GTOPO30), absent when empty or "no data"
    pub dem_m: Option<i32>,
}

impl GazetteerEntry {
    pub fn is_populated_place(&self) -> bool {
        self.feature_class == POPULATED_PLACE_CLASS
    }

    /// Population worth recording; zero means unknown
    pub fn known_population(&self) -> Option<u64> {
        (self.population > 0).then_some(self.population)
    }
}
