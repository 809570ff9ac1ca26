//! Region correction orchestrator.
//!
//! Stages advance strictly in order:
//!
//! ```text
//! Loaded -> CentroidsComputed -> PreDuplicatesFound -> ReassignmentsFound
//!        -> PostDuplicatesFound -> Reported -> Applied | Aborted
//! ```
//!
//! Nothing is written to the store before `Reported`, and `Applied` is only
//! reachable through an explicit confirmation.

mod batch;
mod confirm;
mod report;

pub use batch::write_in_batches;
pub use confirm::{Confirmation, TerminalConfirmation};
pub use report::{RegionFixReport, ReassignmentSample, ReportEnvelope};

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::geo::CentroidTable;
use crate::models::{PlaceId, PlaceRecord};
use crate::regions::{
    effective_state, find_post_duplicates, find_pre_duplicates, PostDuplicates, PreDuplicates, Reassigner,
    Reassignments,
};
use crate::store::{PlaceQuery, PlaceStore, RegionUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Loaded,
    CentroidsComputed,
    PreDuplicatesFound,
    ReassignmentsFound,
    PostDuplicatesFound,
    Reported,
    Applied,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    /// Analysis only, by request
    DryRun,
    /// Apply requested but not confirmed
    Unconfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    DryRun,
    Apply,
}

impl RunMode {
    pub fn from_apply_flag(apply: bool) -> Self {
        if apply {
            RunMode::Apply
        } else {
            RunMode::DryRun
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::DryRun => f.write_str("dry run"),
            RunMode::Apply => f.write_str("apply"),
        }
    }
}

/// What the apply step did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    /// `None` when there was nothing to write
    pub backup: Option<String>,
    pub pre_deleted: usize,
    pub reassigned: usize,
    pub post_deleted: usize,
    pub final_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Applied(ApplySummary),
    Aborted { reason: AbortReason },
}

pub struct RegionFixPipeline {
    config: Config,
    stage: Stage,
    places: Vec<PlaceRecord>,
    centroids: Option<CentroidTable>,
    pre: Option<PreDuplicates>,
    reassignments: Option<Reassignments>,
    post: Option<PostDuplicates>,
    report: Option<RegionFixReport>,
}

impl RegionFixPipeline {
    /// Load every located record from `store`
    pub fn load<S: PlaceStore + ?Sized>(store: &S, config: Config) -> Result<Self> {
        let places = store.load_places(&PlaceQuery::located())?;
        info!("Loaded {} located places", places.len());
        Ok(Self::from_places(places, config))
    }

    pub fn from_places(mut places: Vec<PlaceRecord>, config: Config) -> Self {
        places.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            config,
            stage: Stage::Loaded,
            places,
            centroids: None,
            pre: None,
            reassignments: None,
            post: None,
            report: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn places(&self) -> &[PlaceRecord] {
        &self.places
    }

    fn expect_stage(&self, expected: Stage) -> Result<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(self.out_of_order(expected))
        }
    }

    fn out_of_order(&self, expected: Stage) -> Error {
        Error::StageOutOfOrder {
            expected,
            actual: self.stage,
        }
    }

    pub fn compute_centroids(&mut self) -> Result<&CentroidTable> {
        self.expect_stage(Stage::Loaded)?;
        let table = CentroidTable::compute(&self.places, self.config.thresholds.centroid_outlier_km);
        info!(
            "Centroids: {} regions, {} with a clean centroid",
            table.len(),
            table.defined_count()
        );
        self.stage = Stage::CentroidsComputed;
        Ok(&*self.centroids.insert(table))
    }

    pub fn find_pre_duplicates(&mut self) -> Result<&PreDuplicates> {
        self.expect_stage(Stage::CentroidsComputed)?;
        let centroids = self
            .centroids
            .as_ref()
            .ok_or_else(|| self.out_of_order(Stage::CentroidsComputed))?;

        let pre = find_pre_duplicates(&self.places, centroids);
        info!(
            "Pre-correction duplicates: {} groups, {} records to delete",
            pre.stats.groups, pre.stats.to_delete
        );
        self.stage = Stage::PreDuplicatesFound;
        Ok(&*self.pre.insert(pre))
    }

    pub fn find_reassignments(&mut self) -> Result<&Reassignments> {
        self.expect_stage(Stage::PreDuplicatesFound)?;
        let (Some(centroids), Some(pre)) = (self.centroids.as_ref(), self.pre.as_ref()) else {
            return Err(self.out_of_order(Stage::PreDuplicatesFound));
        };

        let reassigner = Reassigner::from_thresholds(&self.config.thresholds);
        let reassignments = reassigner.find(&self.places, &pre.to_delete, centroids);
        info!(
            "Reassignments: {} of {} examined records",
            reassignments.stats.reassigned, reassignments.stats.examined
        );
        self.stage = Stage::ReassignmentsFound;
        Ok(&*self.reassignments.insert(reassignments))
    }

    pub fn find_post_duplicates(&mut self) -> Result<&PostDuplicates> {
        self.expect_stage(Stage::ReassignmentsFound)?;
        let (Some(pre), Some(reassignments)) = (self.pre.as_ref(), self.reassignments.as_ref()) else {
            return Err(self.out_of_order(Stage::ReassignmentsFound));
        };

        let view = effective_state(&self.places, &reassignments.items);
        let post = find_post_duplicates(
            &view,
            &pre.to_delete,
            self.config.thresholds.post_correction_km,
        );
        info!(
            "Post-correction duplicates: {} records to delete",
            post.stats.to_delete
        );
        self.stage = Stage::PostDuplicatesFound;
        Ok(&*self.post.insert(post))
    }

    pub fn report(&mut self) -> Result<&RegionFixReport> {
        self.expect_stage(Stage::PostDuplicatesFound)?;
        let (Some(centroids), Some(pre), Some(reassignments), Some(post)) = (
            self.centroids.as_ref(),
            self.pre.as_ref(),
            self.reassignments.as_ref(),
            self.post.as_ref(),
        ) else {
            return Err(self.out_of_order(Stage::PostDuplicatesFound));
        };

        let report = RegionFixReport {
            places_loaded: self.places.len(),
            regions: centroids.len(),
            regions_with_centroid: centroids.defined_count(),
            pre_duplicates: pre.stats.clone(),
            reassignments: reassignments.stats.clone(),
            post_duplicates: post.stats.clone(),
            total_deletions: pre.to_delete.len() + post.to_delete.len(),
            sample: reassignments
                .items
                .iter()
                .take(self.config.report.sample_size)
                .map(Into::into)
                .collect(),
        };
        self.stage = Stage::Reported;
        Ok(&*self.report.insert(report))
    }

    /// Run every analysis stage from `Loaded` through `Reported`
    pub fn analyze(&mut self) -> Result<&RegionFixReport> {
        self.compute_centroids()?;
        self.find_pre_duplicates()?;
        self.find_reassignments()?;
        self.find_post_duplicates()?;
        self.report()
    }

    /// Leave `Reported` for `Applied` or `Aborted`.
    ///
    /// In apply mode the operator is asked first; only a yes leads to the
    /// backup and then, in order, pre-correction deletions, region updates
    /// and post-correction deletions.
    pub fn finish<S, C>(
        &mut self,
        store: &mut S,
        mode: RunMode,
        confirmation: &mut C,
    ) -> Result<Outcome>
    where
        S: PlaceStore + ?Sized,
        C: Confirmation + ?Sized,
    {
        self.expect_stage(Stage::Reported)?;
        let (Some(pre), Some(reassignments), Some(post), Some(report)) = (
            self.pre.as_ref(),
            self.reassignments.as_ref(),
            self.post.as_ref(),
            self.report.as_ref(),
        ) else {
            return Err(self.out_of_order(Stage::Reported));
        };

        if mode == RunMode::DryRun {
            info!("Dry run: no changes written");
            return Ok(self.abort(AbortReason::DryRun));
        }

        if !report.has_changes() {
            info!("Nothing to apply");
            let summary = ApplySummary {
                final_count: store.count()?,
                ..ApplySummary::default()
            };
            self.stage = Stage::Applied;
            return Ok(Outcome::Applied(summary));
        }

        let prompt = format!(
            "Delete {} records and reassign {} records?",
            report.total_deletions, report.reassignments.reassigned
        );
        if !confirmation.confirm(&prompt) {
            info!("Not confirmed: no changes written");
            return Ok(self.abort(AbortReason::Unconfirmed));
        }

        let backup = store.backup()?;
        info!("Backup written to {}", backup);

        let batches = &self.config.batches;
        let pre_ids: Vec<PlaceId> = pre.to_delete.iter().cloned().collect();
        let updates: Vec<RegionUpdate> = reassignments
            .items
            .iter()
            .map(|r| RegionUpdate {
                place_id: r.place_id.clone(),
                region: r.to.clone(),
            })
            .collect();
        let post_ids: Vec<PlaceId> = post.to_delete.iter().cloned().collect();

        let pre_deleted = write_in_batches(
            "pre-correction deletes",
            &pre_ids,
            batches.delete_batch,
            batches,
            |chunk| store.delete_places(chunk),
        )?;
        let reassigned = write_in_batches(
            "region updates",
            &updates,
            batches.update_batch,
            batches,
            |chunk| store.update_regions(chunk),
        )?;
        let post_deleted = write_in_batches(
            "post-correction deletes",
            &post_ids,
            batches.delete_batch,
            batches,
            |chunk| store.delete_places(chunk),
        )?;

        let final_count = store.count()?;
        info!("Final record count: {}", final_count);

        self.stage = Stage::Applied;
        Ok(Outcome::Applied(ApplySummary {
            backup: Some(backup.to_string()),
            pre_deleted,
            reassigned,
            post_deleted,
            final_count,
        }))
    }

    fn abort(&mut self, reason: AbortReason) -> Outcome {
        self.stage = Stage::Aborted(reason);
        Outcome::Aborted { reason }
    }
}

/// Load, analyse and finish in one call
pub fn run<S, C>(
    store: &mut S,
    config: Config,
    mode: RunMode,
    confirmation: &mut C,
) -> Result<(RegionFixReport, Outcome)>
where
    S: PlaceStore + ?Sized,
    C: Confirmation + ?Sized,
{
    let mut pipeline = RegionFixPipeline::load(&*store, config)?;
    let report = pipeline.analyze()?.clone();
    let outcome = pipeline.finish(store, mode, confirmation)?;
    Ok((report, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, RegionRef};
    use crate::store::MemoryStore;

    fn place(id: &str, name: &str, region: &str, lon: f64) -> PlaceRecord {
        PlaceRecord::new(
            id,
            name,
            "XX",
            RegionRef::new(region, format!("Region {}", region), format!("region-{}", region.to_lowercase())),
            Some(GeoPoint { lat: 0.0, lon }),
        )
    }

    /// Region X around lon 0 with a stray "Alba" at lon 4.0; region Y around
    /// lon 4.4 already holding an "Alba" and a pair of exact duplicates
    fn equator_store(with_alba_in_y: bool) -> MemoryStore {
        let mut places: Vec<PlaceRecord> = (1..=9)
            .map(|i| place(&i.to_string(), &format!("X{}", i), "X", 0.0))
            .collect();
        places.push(place("10", "Alba", "X", 4.0));
        places.push(place("20", "Y1", "Y", 4.45));
        places.push(place("21", "Y2", "Y", 4.45));
        places.push(place("30", "Twin", "Y", 4.45));
        places.push(place("31", "Twin", "Y", 4.4502));
        if with_alba_in_y {
            places.push(place("0", "Alba", "Y", 4.3));
        }
        MemoryStore::from_places(places)
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.batches.retry_delay_ms = 0;
        config
    }

    #[test]
    fn test_analysis_report() {
        let store = equator_store(true);
        let mut pipeline = RegionFixPipeline::load(&store, config()).unwrap();
        let report = pipeline.analyze().unwrap().clone();

        assert_eq!(pipeline.stage(), Stage::Reported);
        assert_eq!(store.count().unwrap(), 15);
        assert_eq!(report.places_loaded, 15);
        assert_eq!(report.pre_duplicates.groups, 1);
        assert_eq!(report.pre_duplicates.same_region, 1);
        assert_eq!(report.reassignments.reassigned, 1);
        assert_eq!(report.post_duplicates.to_delete, 1);
        assert_eq!(report.total_deletions, 2);
        assert_eq!(report.sample[0].to_region, "Region Y");
    }

    #[test]
    fn test_dry_run_leaves_store_untouched() {
        let mut store = equator_store(true);
        let before = store.snapshot();
        let mut never = |_: &str| -> bool { panic!("dry run must not prompt") };

        let (report, outcome) = run(&mut store, config(), RunMode::DryRun, &mut never).unwrap();

        assert!(report.has_changes());
        assert_eq!(outcome, Outcome::Aborted { reason: AbortReason::DryRun });
        assert_eq!(store.snapshot(), before);
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_declined_confirmation_aborts_without_backup() {
        let mut store = equator_store(true);
        let before = store.snapshot();
        let mut pipeline = RegionFixPipeline::load(&store, config()).unwrap();
        pipeline.analyze().unwrap();

        let mut decline = |_: &str| false;
        let outcome = pipeline.finish(&mut store, RunMode::Apply, &mut decline).unwrap();

        assert_eq!(outcome, Outcome::Aborted { reason: AbortReason::Unconfirmed });
        assert_eq!(pipeline.stage(), Stage::Aborted(AbortReason::Unconfirmed));
        assert_eq!(store.snapshot(), before);
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_apply_after_confirmation() {
        let mut store = equator_store(true);
        let mut prompts = Vec::new();
        let mut accept = |p: &str| {
            prompts.push(p.to_string());
            true
        };

        let (_, outcome) = run(&mut store, config(), RunMode::Apply, &mut accept).unwrap();

        assert_eq!(prompts, vec!["Delete 2 records and reassign 1 records?"]);
        let Outcome::Applied(summary) = outcome else {
            panic!("expected apply, got {:?}", outcome);
        };
        assert_eq!(summary.pre_deleted, 1);
        assert_eq!(summary.reassigned, 1);
        assert_eq!(summary.post_deleted, 1);
        assert_eq!(summary.final_count, 13);
        assert_eq!(summary.backup.as_deref(), Some("in-memory snapshot #1"));

        // The backup holds the pre-mutation state
        assert_eq!(store.backups()[0].len(), 15);
        assert!(store.get("31").is_none());
        assert!(store.get("30").is_some());
        // Reassigned, then removed as a post-correction duplicate of 0
        assert!(store.get("10").is_none());
        assert!(store.get("0").is_some());
        assert_eq!(store.get("5").unwrap().name, "X5");
    }

    #[test]
    fn test_apply_updates_region_with_canonical_metadata() {
        let mut store = equator_store(false);
        let mut accept = |_: &str| true;
        run(&mut store, config(), RunMode::Apply, &mut accept).unwrap();

        let alba = store.get("10").unwrap();
        assert_eq!(alba.region, RegionRef::new("Y", "Region Y", "region-y"));
    }

    #[test]
    fn test_failed_batch_is_retried() {
        let mut store = equator_store(true);
        store.fail_next_writes(1);
        let mut accept = |_: &str| true;

        let (_, outcome) = run(&mut store, config(), RunMode::Apply, &mut accept).unwrap();
        assert!(matches!(outcome, Outcome::Applied(_)));
        assert_eq!(store.count().unwrap(), 13);
    }

    #[test]
    fn test_persistent_failure_surfaces_batch_error() {
        let mut store = equator_store(true);
        store.fail_next_writes(10);
        let mut accept = |_: &str| true;

        let err = run(&mut store, config(), RunMode::Apply, &mut accept).unwrap_err();
        assert!(matches!(err, Error::BatchFailed { attempts: 2, batch: 1, .. }));
        // Backup was taken, nothing committed
        assert_eq!(store.backups().len(), 1);
        assert_eq!(store.count().unwrap(), 15);
    }

    #[test]
    fn test_nothing_to_apply_skips_prompt_and_backup() {
        let mut store = MemoryStore::from_places(vec![place("1", "Solo", "X", 0.0), place("2", "Duo", "X", 0.1)]);
        let mut never = |_: &str| -> bool { panic!("nothing to confirm") };

        let (report, outcome) = run(&mut store, config(), RunMode::Apply, &mut never).unwrap();
        assert!(!report.has_changes());
        let Outcome::Applied(summary) = outcome else {
            panic!("expected apply");
        };
        assert_eq!(summary.backup, None);
        assert_eq!(summary.final_count, 2);
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_stages_must_run_in_order() {
        let store = equator_store(true);
        let mut pipeline = RegionFixPipeline::load(&store, config()).unwrap();

        let err = pipeline.find_reassignments().err().unwrap();
        assert!(matches!(
            err,
            Error::StageOutOfOrder {
                expected: Stage::PreDuplicatesFound,
                actual: Stage::Loaded
            }
        ));

        pipeline.compute_centroids().unwrap();
        assert!(pipeline.compute_centroids().is_err());

        let mut store = MemoryStore::new();
        let mut accept = |_: &str| true;
        assert!(pipeline.finish(&mut store, RunMode::Apply, &mut accept).is_err());
        assert_eq!(pipeline.stage(), Stage::CentroidsComputed);
    }

    #[test]
    fn test_sample_is_capped() {
        let store = equator_store(true);
        let mut config = config();
        config.report.sample_size = 0;
        let mut pipeline = RegionFixPipeline::load(&store, config).unwrap();
        let report = pipeline.analyze().unwrap();
        assert!(report.sample.is_empty());
        assert_eq!(report.reassignments.reassigned, 1);
    }
}
