//! Place store port and its adapters.
//!
//! The pipeline only ever reads a full snapshot, updates enrichment and
//! region fields by id, and deletes by id. It never creates records.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::models::{PlaceId, PlaceRecord, RegionRef};

/// Read-path predicate over loaded records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaceQuery {
    /// Only records with valid coordinates
    pub require_coordinates: bool,
    /// Filter on the "is a populated place" flag
    pub populated: Option<bool>,
}

impl PlaceQuery {
    /// Every record, located or not
    pub fn all() -> Self {
        Self::default()
    }

    /// Records with coordinates
    pub fn located() -> Self {
        Self {
            require_coordinates: true,
            populated: None,
        }
    }

    pub fn populated(mut self, populated: bool) -> Self {
        self.populated = Some(populated);
        self
    }

    pub fn matches(&self, place: &PlaceRecord) -> bool {
        if self.require_coordinates && place.location.is_none() {
            return false;
        }
        match self.populated {
            Some(flag) => place.is_populated == flag,
            None => true,
        }
    }
}

/// A record classified as a populated place
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub place_id: PlaceId,
    /// `None` when the gazetteer gives no population
    pub population: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElevationUpdate {
    pub place_id: PlaceId,
    pub elevation_m: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionUpdate {
    pub place_id: PlaceId,
    pub region: RegionRef,
}

/// Where a pre-mutation backup was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupLocation {
    File(PathBuf),
    /// In-process snapshot (memory store)
    Snapshot(usize),
}

impl fmt::Display for BackupLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupLocation::File(path) => write!(f, "{}", path.display()),
            BackupLocation::Snapshot(n) => write!(f, "in-memory snapshot #{}", n),
        }
    }
}

/// Persistence boundary for place records
pub trait PlaceStore {
    /// Add the enrichment fields if missing; returns the names of added fields.
    /// Idempotent.
    fn ensure_schema(&mut self) -> Result<Vec<String>>;

    /// Load every record matching `query`
    fn load_places(&self, query: &PlaceQuery) -> Result<Vec<PlaceRecord>>;

    /// Atomically clear population and classification on every record,
    /// then mark `classified` as populated places.
    fn apply_classification(&mut self, classified: &[Classification]) -> Result<()>;

    /// One batch of elevation writes, committed together
    fn update_elevations(&mut self, batch: &[ElevationUpdate]) -> Result<usize>;

    /// One batch of region reassignments, committed together
    fn update_regions(&mut self, batch: &[RegionUpdate]) -> Result<usize>;

    /// One batch of deletions, committed together
    fn delete_places(&mut self, ids: &[PlaceId]) -> Result<usize>;

    fn count(&self) -> Result<usize>;

    /// Copy the whole store aside before the first mutation
    fn backup(&self) -> Result<BackupLocation>;
}
