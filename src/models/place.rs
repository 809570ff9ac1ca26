//! Place record structure as loaded from the place store.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::{RegionKey, RegionRef};

/// Geographic point (lat/lon, degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Create a point, rejecting coordinates outside [-90, 90] x [-180, 180]
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }
}

/// Stable place identifier.
///
/// Identifiers are opaque strings in the store. Ordering is numeric when both
/// sides are plain decimal integers so that "9" sorts before "10"; numeric
/// identifiers sort before any non-numeric one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(String);

impl PlaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

impl Ord for PlaceId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for PlaceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlaceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlaceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A city or point of interest in the place store.
///
/// `population` and `is_populated` are owned by the population reconciler;
/// `elevation_m` is independent of classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub id: PlaceId,

    /// Display name
    pub name: String,

    /// Uppercase ISO country code
    pub country: String,

    /// Assigned administrative region
    pub region: RegionRef,

    /// Coordinates, absent for records the import could not locate
    pub location: Option<GeoPoint>,

    pub population: Option<u64>,

    /// Elevation in meters
    pub elevation_m: Option<i32>,

    /// Whether the record is a settlement rather than a feature
    pub is_populated: bool,
}

impl PlaceRecord {
    /// Create a record with no enrichment attributes
    pub fn new(
        id: impl Into<PlaceId>,
        name: impl Into<String>,
        country: &str,
        region: RegionRef,
        location: Option<GeoPoint>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country: country.trim().to_uppercase(),
            region,
            location,
            population: None,
            elevation_m: None,
            is_populated: false,
        }
    }

    pub fn region_key(&self) -> RegionKey {
        RegionKey::new(self.country.clone(), self.region.id.clone())
    }

    /// Case-folded name used for duplicate grouping
    pub fn normalized_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Records taking part in region analysis need a name, a region and coordinates
    pub fn is_region_candidate(&self) -> bool {
        self.location.is_some() && !self.name.is_empty() && self.region.is_assigned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_rejects_out_of_range() {
        assert!(GeoPoint::new(45.0, 7.0).is_some());
        assert!(GeoPoint::new(90.0, -180.0).is_some());
        assert!(GeoPoint::new(90.5, 0.0).is_none());
        assert!(GeoPoint::new(0.0, 181.0).is_none());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn test_place_id_numeric_order() {
        let mut ids: Vec<PlaceId> = ["10", "9", "abc", "100", "007"]
            .into_iter()
            .map(PlaceId::from)
            .collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(PlaceId::as_str).collect();
        assert_eq!(sorted, vec!["007", "9", "10", "100", "abc"]);
    }

    #[test]
    fn test_place_id_order_consistent_with_eq() {
        let a = PlaceId::from("7");
        let b = PlaceId::from("007");
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_country_is_uppercased() {
        let place = PlaceRecord::new("1", "Torino", " it", RegionRef::default(), None);
        assert_eq!(place.country, "IT");
        assert!(!place.is_region_candidate());
    }
}
