//! Population/classification and elevation enrichment.
//!
//! Both phases are computed from a read-only snapshot; nothing is written
//! until [`apply_enrichment`] runs after an explicit confirmation.

mod elevation;
mod population;
mod report;

pub use elevation::{ElevationAnnotator, ElevationOutcome, ElevationStats};
pub use population::{PopulationMatch, PopulationReconciler, ReconcileOutcome, ReconcileStats};
pub use report::EnrichReport;

use serde::Serialize;
use tracing::info;

use crate::config::BatchConfig;
use crate::error::Result;
use crate::pipeline::{write_in_batches, AbortReason, Confirmation, RunMode};
use crate::store::PlaceStore;

/// Computed enrichment, ready to be written
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub population: Option<ReconcileOutcome>,
    pub elevation: Option<ElevationOutcome>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.population.is_none() && self.elevation.as_ref().map_or(true, |e| e.updates.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichApplied {
    pub backup: Option<String>,
    pub columns_added: Vec<String>,
    pub classified: usize,
    pub elevations_updated: usize,
    pub final_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichOutcome {
    Applied(EnrichApplied),
    Aborted { reason: AbortReason },
}

/// Write `enrichment` to `store`.
///
/// In apply mode: confirm, back up, add any missing enrichment fields, then
/// reset-then-apply the classification and write elevation changes in
/// batches. Phases that were not computed leave their fields untouched.
pub fn apply_enrichment<S, C>(
    store: &mut S,
    enrichment: &Enrichment,
    mode: RunMode,
    confirmation: &mut C,
    batches: &BatchConfig,
) -> Result<EnrichOutcome>
where
    S: PlaceStore + ?Sized,
    C: Confirmation + ?Sized,
{
    if mode == RunMode::DryRun {
        info!("Dry run: no changes written");
        return Ok(EnrichOutcome::Aborted {
            reason: AbortReason::DryRun,
        });
    }

    if enrichment.is_empty() {
        info!("Nothing to apply");
        return Ok(EnrichOutcome::Applied(EnrichApplied {
            final_count: store.count()?,
            ..EnrichApplied::default()
        }));
    }

    let classifications = enrichment
        .population
        .as_ref()
        .map(|p| p.classifications())
        .unwrap_or_default();
    let elevation_updates = enrichment
        .elevation
        .as_ref()
        .map(|e| e.updates.as_slice())
        .unwrap_or_default();

    let mut prompt = String::from("Write");
    if enrichment.population.is_some() {
        prompt.push_str(&format!(
            " population/classification ({} populated places, all others reset)",
            classifications.len()
        ));
    }
    if !elevation_updates.is_empty() {
        if enrichment.population.is_some() {
            prompt.push_str(" and");
        }
        prompt.push_str(&format!(" {} elevation values", elevation_updates.len()));
    }
    prompt.push('?');

    if !confirmation.confirm(&prompt) {
        info!("Not confirmed: no changes written");
        return Ok(EnrichOutcome::Aborted {
            reason: AbortReason::Unconfirmed,
        });
    }

    let backup = store.backup()?;
    info!("Backup written to {}", backup);

    let columns_added = store.ensure_schema()?;

    let mut applied = EnrichApplied {
        backup: Some(backup.to_string()),
        columns_added,
        ..EnrichApplied::default()
    };

    if enrichment.population.is_some() {
        store.apply_classification(&classifications)?;
        applied.classified = classifications.len();
        info!("Classification applied to {} places", applied.classified);
    }

    applied.elevations_updated = write_in_batches(
        "elevation updates",
        elevation_updates,
        batches.update_batch,
        batches,
        |chunk| store.update_elevations(chunk),
    )?;

    applied.final_count = store.count()?;
    info!("Final record count: {}", applied.final_count);
    Ok(EnrichOutcome::Applied(applied))
}
