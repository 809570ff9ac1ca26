//! In-memory place store.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;

use super::{BackupLocation, Classification, ElevationUpdate, PlaceQuery, PlaceStore, RegionUpdate};
use crate::error::{Error, Result};
use crate::models::{PlaceId, PlaceRecord};

/// Place store backed by an ordered map.
///
/// Writes can be made to fail on demand to exercise batch retries.
#[derive(Debug, Default)]
pub struct MemoryStore {
    places: BTreeMap<PlaceId, PlaceRecord>,
    backups: RefCell<Vec<Vec<PlaceRecord>>>,
    failing_writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_places(places: impl IntoIterator<Item = PlaceRecord>) -> Self {
        let mut store = Self::new();
        for place in places {
            store.insert(place);
        }
        store
    }

    pub fn insert(&mut self, place: PlaceRecord) {
        self.places.insert(place.id.clone(), place);
    }

    pub fn get(&self, id: &str) -> Option<&PlaceRecord> {
        self.places.get(&PlaceId::from(id))
    }

    /// All records in id order
    pub fn snapshot(&self) -> Vec<PlaceRecord> {
        self.places.values().cloned().collect()
    }

    /// Backups taken so far, oldest first
    pub fn backups(&self) -> Vec<Vec<PlaceRecord>> {
        self.backups.borrow().clone()
    }

    /// Make the next `n` write calls fail
    pub fn fail_next_writes(&mut self, n: usize) {
        self.failing_writes = n;
    }

    fn check_write(&mut self) -> Result<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(Error::Io(io::Error::other("injected write failure")));
        }
        Ok(())
    }
}

impl PlaceStore for MemoryStore {
    fn ensure_schema(&mut self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn load_places(&self, query: &PlaceQuery) -> Result<Vec<PlaceRecord>> {
        Ok(self
            .places
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect())
    }

    fn apply_classification(&mut self, classified: &[Classification]) -> Result<()> {
        self.check_write()?;
        for place in self.places.values_mut() {
            place.population = None;
            place.is_populated = false;
        }
        for c in classified {
            if let Some(place) = self.places.get_mut(&c.place_id) {
                place.population = c.population;
                place.is_populated = true;
            }
        }
        Ok(())
    }

    fn update_elevations(&mut self, batch: &[ElevationUpdate]) -> Result<usize> {
        self.check_write()?;
        let mut updated = 0;
        for u in batch {
            if let Some(place) = self.places.get_mut(&u.place_id) {
                place.elevation_m = Some(u.elevation_m);
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn update_regions(&mut self, batch: &[RegionUpdate]) -> Result<usize> {
        self.check_write()?;
        let mut updated = 0;
        for u in batch {
            if let Some(place) = self.places.get_mut(&u.place_id) {
                place.region = u.region.clone();
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn delete_places(&mut self, ids: &[PlaceId]) -> Result<usize> {
        self.check_write()?;
        Ok(ids.iter().filter(|id| self.places.remove(*id).is_some()).count())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.places.len())
    }

    fn backup(&self) -> Result<BackupLocation> {
        let mut backups = self.backups.borrow_mut();
        backups.push(self.snapshot());
        Ok(BackupLocation::Snapshot(backups.len()))
    }
}
