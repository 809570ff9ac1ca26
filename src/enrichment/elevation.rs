//! Per-record elevation lookup.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::elevation::ElevationModel;
use crate::models::PlaceRecord;
use crate::store::ElevationUpdate;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElevationStats {
    pub looked_up: usize,
    pub resolved: usize,
    /// Resolved to the value already stored
    pub unchanged: usize,
    /// Not resolvable; any stored value is kept
    pub unresolved: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ElevationOutcome {
    /// Only values that differ from the stored ones, in input order
    pub updates: Vec<ElevationUpdate>,
    pub stats: ElevationStats,
}

/// Queries an elevation model at the exact coordinates of every record
pub struct ElevationAnnotator<'m> {
    model: &'m dyn ElevationModel,
}

impl<'m> ElevationAnnotator<'m> {
    pub fn new(model: &'m dyn ElevationModel) -> Self {
        Self { model }
    }

    pub fn annotate(&self, places: &[PlaceRecord], pb: &ProgressBar) -> ElevationOutcome {
        let located: Vec<&PlaceRecord> = places.iter().filter(|p| p.location.is_some()).collect();
        info!(
            "Looking up elevation for {} places ({})",
            located.len(),
            self.model.name()
        );
        pb.set_length(located.len() as u64);

        let lookups: Vec<Option<i32>> = located
            .par_iter()
            .map(|place| {
                pb.inc(1);
                place
                    .location
                    .and_then(|loc| self.model.lookup(loc, &place.country))
            })
            .collect();
        pb.finish_and_clear();

        let mut outcome = ElevationOutcome::default();
        outcome.stats.looked_up = located.len();

        for (place, value) in located.into_iter().zip(lookups) {
            match value {
                None => outcome.stats.unresolved += 1,
                Some(v) => {
                    outcome.stats.resolved += 1;
                    if place.elevation_m == Some(v) {
                        outcome.stats.unchanged += 1;
                    } else {
                        outcome.updates.push(ElevationUpdate {
                            place_id: place.id.clone(),
                            elevation_m: v,
                        });
                    }
                }
            }
        }

        info!(
            "  {} resolved ({} changed), {} unresolved",
            outcome.stats.resolved,
            outcome.updates.len(),
            outcome.stats.unresolved
        );
        outcome
    }
}
