//! Core data models for the place store and its external sources.

pub mod gazetteer;
pub mod place;
pub mod region;

pub use gazetteer::{GazetteerEntry, POPULATED_PLACE_CLASS};
pub use place::{GeoPoint, PlaceId, PlaceRecord};
pub use region::{RegionKey, RegionRef};
