//! Spatial primitives: great-circle distance, grid index, region centroids.

mod centroid;
mod distance;
mod grid;

pub use centroid::{Centroid, CentroidTable};
pub use distance::{haversine_km, round_km, EARTH_RADIUS_KM, KM_PER_DEGREE};
pub use grid::{GridIndex, Neighbor};
