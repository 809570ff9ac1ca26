//! Grid-bucketed spatial index partitioned by country.
//!
//! Each country owns a map of one-degree cells keyed by
//! `(floor(lat), floor(lon))`. A radius query scans the block of cells around
//! the query cell and filters candidates by exact haversine distance.
//!
//! Coverage: a cell is 111.19 km tall, and `lat_span = ceil(r / 111.19)`
//! rows are scanned on each side, so every point within `r` is reached in
//! latitude. Longitude cells shrink with `cos(lat)`; the longitude span is
//! sized at the most poleward latitude the search can touch. For every
//! radius the pipeline uses (at most 50 km) this is the plain 3x3 block
//! anywhere below ~63 degrees of latitude.

use hashbrown::HashMap;

use super::distance::{haversine_km, KM_PER_DEGREE};
use crate::models::GeoPoint;

type Cell = (i32, i32);

/// Number of one-degree longitude cells around the globe
const LON_CELLS: i32 = 360;

/// A candidate within the query radius
#[derive(Debug)]
pub struct Neighbor<'a, T> {
    pub payload: &'a T,
    pub location: GeoPoint,
    pub distance_km: f64,
}

impl<T> Clone for Neighbor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Neighbor<'_, T> {}

/// Spatial index over (country, point, payload) triples
pub struct GridIndex<T> {
    countries: HashMap<String, HashMap<Cell, Vec<(GeoPoint, T)>>>,
    len: usize,
}

impl<T> GridIndex<T> {
    pub fn new() -> Self {
        Self {
            countries: HashMap::new(),
            len: 0,
        }
    }

    /// Build the index from an iterator of entries
    pub fn build<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, GeoPoint, T)>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        for (country, point, payload) in entries {
            index.insert(country.as_ref(), point, payload);
        }
        index
    }

    pub fn insert(&mut self, country: &str, point: GeoPoint, payload: T) {
        self.countries
            .entry(country.to_string())
            .or_default()
            .entry(cell_of(point))
            .or_default()
            .push((point, payload));
        self.len += 1;
    }

    /// Closest entry of `country` within `radius_km`.
    ///
    /// Ties keep the first candidate in scan order, which is deterministic
    /// for a given index.
    pub fn nearest(&self, point: GeoPoint, country: &str, radius_km: f64) -> Option<Neighbor<'_, T>> {
        let mut best: Option<Neighbor<'_, T>> = None;
        self.scan(point, country, radius_km, |neighbor| {
            if best.map_or(true, |b| neighbor.distance_km < b.distance_km) {
                best = Some(neighbor);
            }
        });
        best
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of countries with at least one entry
    pub fn country_count(&self) -> usize {
        self.countries.len()
    }

    fn scan<'a, F>(&'a self, point: GeoPoint, country: &str, radius_km: f64, mut visit: F)
    where
        F: FnMut(Neighbor<'a, T>),
    {
        let Some(cells) = self.countries.get(country) else {
            return;
        };
        if !(radius_km >= 0.0) {
            return;
        }

        let (cell_lat, cell_lon) = cell_of(point);
        let lat_span = (radius_km / KM_PER_DEGREE).ceil().max(1.0) as i32;
        let lon_offsets = lon_offsets(point, radius_km);

        for d_lat in -lat_span..=lat_span {
            for &d_lon in &lon_offsets {
                let cell = (cell_lat + d_lat, wrap_lon_cell(cell_lon + d_lon));
                let Some(bucket) = cells.get(&cell) else {
                    continue;
                };
                for (candidate, payload) in bucket {
                    let distance_km = haversine_km(point, *candidate);
                    if distance_km <= radius_km {
                        visit(Neighbor {
                            payload,
                            location: *candidate,
                            distance_km,
                        });
                    }
                }
            }
        }
    }
}

impl<T> Default for GridIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn cell_of(point: GeoPoint) -> Cell {
    (point.lat.floor() as i32, wrap_lon_cell(point.lon.floor() as i32))
}

/// Longitude 180 shares the cell of -180
fn wrap_lon_cell(lon_cell: i32) -> i32 {
    (lon_cell + 180).rem_euclid(LON_CELLS) - 180
}

/// Longitude cell offsets to scan, each wrapped cell visited once
fn lon_offsets(point: GeoPoint, radius_km: f64) -> Vec<i32> {
    let poleward_lat = (point.lat.abs() + radius_km / KM_PER_DEGREE).min(90.0);
    let km_per_lon_degree = KM_PER_DEGREE * poleward_lat.to_radians().cos();

    let span = if km_per_lon_degree <= radius_km / f64::from(LON_CELLS) {
        LON_CELLS
    } else {
        ((radius_km / km_per_lon_degree).ceil().max(1.0) as i32).min(LON_CELLS)
    };

    if 2 * span + 1 >= LON_CELLS {
        (0..LON_CELLS).collect()
    } else {
        (-span..=span).collect()
    }
}
