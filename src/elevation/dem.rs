//! Coarse elevation borrowed from the gazetteer's DEM field.

use crate::geo::GridIndex;
use crate::models::{GazetteerEntry, GeoPoint};

use super::ElevationModel;

/// Nearest gazetteer entry of the same country within `same_place_km`.
///
/// Farther entries describe a different settlement, so their DEM value is
/// never returned.
pub struct GazetteerDem {
    index: GridIndex<i32>,
    same_place_km: f64,
}

impl GazetteerDem {
    pub fn new(entries: &[GazetteerEntry], same_place_km: f64) -> Self {
        let index = GridIndex::build(
            entries
                .iter()
                .filter_map(|e| e.dem_m.map(|dem| (e.country.as_str(), e.location, dem))),
        );
        Self { index, same_place_km }
    }

    /// Entries carrying a DEM value
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl ElevationModel for GazetteerDem {
    fn name(&self) -> &str {
        "gazetteer-dem"
    }

    fn lookup(&self, point: GeoPoint, country: &str) -> Option<i32> {
        self.index
            .nearest(point, country, self.same_place_km)
            .map(|n| *n.payload)
    }
}
