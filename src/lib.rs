//! Placemend - offline reconciliation and enrichment of a place store.
//!
//! This library provides the spatial primitives, the enrichment phases
//! (population, classification, elevation) and the region-correction
//! pipeline shared by the `enrich` and `fix-regions` binaries.

pub mod config;
pub mod elevation;
pub mod enrichment;
pub mod error;
pub mod gazetteer;
pub mod geo;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod regions;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{GeoPoint, PlaceId, PlaceRecord, RegionKey, RegionRef};
