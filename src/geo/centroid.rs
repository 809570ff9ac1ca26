//! Outlier-trimmed region centroids.
//!
//! Pass 1 takes the unweighted mean of every member of a region (raw
//! centroid). Pass 2 averages only the members within the outlier distance
//! of the raw centroid (clean centroid). A region where pass 2 keeps nobody
//! has no clean centroid.
//!
//! The table is immutable: rebuild it whenever the member set changes.

use hashbrown::HashMap;
use tracing::debug;

use super::distance::haversine_km;
use crate::models::{GeoPoint, PlaceRecord, RegionKey, RegionRef};

/// Clean centroid of a region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    pub location: GeoPoint,
    /// Members that survived outlier trimming
    pub members: usize,
}

#[derive(Debug, Clone)]
struct RegionStats {
    raw: GeoPoint,
    clean: Option<Centroid>,
}

/// Raw and clean centroids for every (country, region) in a snapshot
#[derive(Debug, Clone)]
pub struct CentroidTable {
    regions: HashMap<RegionKey, RegionStats>,
    /// country -> (clean centroid, canonical region), sorted by region id
    by_country: HashMap<String, Vec<(GeoPoint, RegionRef)>>,
}

impl CentroidTable {
    /// Compute centroids over all region candidates in `places`
    pub fn compute<'a, I>(places: I, outlier_km: f64) -> Self
    where
        I: IntoIterator<Item = &'a PlaceRecord>,
    {
        let mut members: HashMap<RegionKey, Vec<&'a PlaceRecord>> = HashMap::new();
        for place in places {
            if place.is_region_candidate() {
                members.entry(place.region_key()).or_default().push(place);
            }
        }

        let mut regions = HashMap::with_capacity(members.len());
        let mut by_country: HashMap<String, Vec<(GeoPoint, RegionRef)>> = HashMap::new();

        for (key, group) in members {
            let points: Vec<GeoPoint> = group.iter().filter_map(|p| p.location).collect();
            let Some(raw) = mean(&points) else {
                continue;
            };

            let kept: Vec<&PlaceRecord> = group
                .iter()
                .copied()
                .filter(|p| p.location.is_some_and(|loc| haversine_km(loc, raw) <= outlier_km))
                .collect();

            let kept_points: Vec<GeoPoint> = kept.iter().filter_map(|p| p.location).collect();
            let clean = mean(&kept_points).map(|location| Centroid {
                location,
                members: kept_points.len(),
            });

            if let (Some(c), Some(canonical)) = (clean, canonical_region(&kept)) {
                by_country
                    .entry(key.country.clone())
                    .or_default()
                    .push((c.location, canonical));
            }

            regions.insert(key, RegionStats { raw, clean });
        }

        for list in by_country.values_mut() {
            list.sort_by(|a, b| a.1.id.cmp(&b.1.id));
        }

        debug!(
            "Computed centroids for {} regions, {} without a clean centroid",
            regions.len(),
            regions.values().filter(|r| r.clean.is_none()).count()
        );

        Self { regions, by_country }
    }

    /// Unweighted mean of all members
    pub fn raw(&self, key: &RegionKey) -> Option<GeoPoint> {
        self.regions.get(key).map(|r| r.raw)
    }

    /// Outlier-trimmed centroid; `None` when no member survived trimming
    pub fn clean(&self, key: &RegionKey) -> Option<Centroid> {
        self.regions.get(key).and_then(|r| r.clean)
    }

    /// Nearest clean centroid in `country`, excluding `exclude_region_id`.
    ///
    /// Returns the region with its canonical display name and slug (the
    /// majority among the members that survived trimming). Ties resolve to
    /// the smallest region id.
    pub fn nearest_other(
        &self,
        country: &str,
        exclude_region_id: &str,
        point: GeoPoint,
    ) -> Option<(&RegionRef, f64)> {
        let mut best: Option<(&RegionRef, f64)> = None;
        for (centroid, region) in self.by_country.get(country)? {
            if region.id == exclude_region_id {
                continue;
            }
            let d = haversine_km(point, *centroid);
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((region, d));
            }
        }
        best
    }

    /// Number of regions seen (with or without a clean centroid)
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Number of regions with a clean centroid
    pub fn defined_count(&self) -> usize {
        self.regions.values().filter(|r| r.clean.is_some()).count()
    }
}

fn mean(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sum_lat, sum_lon) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
    Some(GeoPoint {
        lat: sum_lat / n,
        lon: sum_lon / n,
    })
}

/// Majority (name, slug) pair; ties go to the first one seen
fn canonical_region(members: &[&PlaceRecord]) -> Option<RegionRef> {
    let mut counts: Vec<(&RegionRef, usize)> = Vec::new();
    let mut position: HashMap<(&str, &str), usize> = HashMap::new();

    for place in members {
        let key = (place.region.name.as_str(), place.region.slug.as_str());
        match position.get(&key) {
            Some(&i) => counts[i].1 += 1,
            None => {
                position.insert(key, counts.len());
                counts.push((&place.region, 1));
            }
        }
    }

    let mut best: Option<(&RegionRef, usize)> = None;
    for (region, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((region, count));
        }
    }
    best.map(|(region, _)| region.clone())
}
