//! Pre-apply review report of the region correction pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::Result;
use crate::geo::round_km;
use crate::models::PlaceId;
use crate::regions::{PostDuplicateStats, PreDuplicateStats, ReassignStats, Reassignment};

/// One proposed reassignment, as shown to the operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReassignmentSample {
    pub place_id: PlaceId,
    pub name: String,
    pub from_region: String,
    pub to_region: String,
    /// Rounded to 0.1 km
    pub dist_assigned_km: f64,
    /// Rounded to 0.1 km
    pub dist_best_km: f64,
}

impl From<&Reassignment> for ReassignmentSample {
    fn from(r: &Reassignment) -> Self {
        Self {
            place_id: r.place_id.clone(),
            name: r.name.clone(),
            from_region: r.from.name.clone(),
            to_region: r.to.name.clone(),
            dist_assigned_km: round_km(r.dist_assigned_km),
            dist_best_km: round_km(r.dist_best_km),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionFixReport {
    pub places_loaded: usize,
    pub regions: usize,
    pub regions_with_centroid: usize,
    pub pre_duplicates: PreDuplicateStats,
    pub reassignments: ReassignStats,
    pub post_duplicates: PostDuplicateStats,
    /// Pre- and post-correction deletions combined
    pub total_deletions: usize,
    /// First reassignments in id order
    pub sample: Vec<ReassignmentSample>,
}

impl RegionFixReport {
    pub fn has_changes(&self) -> bool {
        self.total_deletions > 0 || self.reassignments.reassigned > 0
    }
}

impl fmt::Display for RegionFixReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pre = &self.pre_duplicates;
        let re = &self.reassignments;
        let post = &self.post_duplicates;

        writeln!(f, "{:=<64}", "")?;
        writeln!(f, "  Region correction report")?;
        writeln!(f, "{:=<64}", "")?;
        writeln!(f, "  Places loaded                       : {:>8}", self.places_loaded)?;
        writeln!(
            f,
            "  Regions (with clean centroid)       : {:>8} ({})",
            self.regions, self.regions_with_centroid
        )?;
        writeln!(f)?;
        writeln!(f, "  Duplicate groups (pre-correction)   : {:>8}", pre.groups)?;
        writeln!(f, "    same region                       : {:>8}", pre.same_region)?;
        writeln!(f, "    different regions                 : {:>8}", pre.different_region)?;
        writeln!(f, "    no centroid, smallest id kept     : {:>8}", pre.no_centroid)?;
        writeln!(f, "    records to delete                 : {:>8}", pre.to_delete)?;
        writeln!(f)?;
        writeln!(f, "  Records examined for reassignment   : {:>8}", re.examined)?;
        writeln!(f, "    accepted                          : {:>8}", re.accepted)?;
        writeln!(f, "    suspicious, below ratio           : {:>8}", re.below_ratio)?;
        writeln!(f, "    skipped (no centroid)             : {:>8}", re.no_centroid)?;
        writeln!(f, "    skipped (no alternate region)     : {:>8}", re.no_alternate)?;
        writeln!(f, "    records to reassign               : {:>8}", re.reassigned)?;
        writeln!(f)?;
        writeln!(f, "  Post-correction duplicate groups    : {:>8}", post.groups_with_duplicates)?;
        writeln!(f, "    records to delete                 : {:>8}", post.to_delete)?;
        writeln!(f)?;
        writeln!(f, "  Total deletions                     : {:>8}", self.total_deletions)?;

        if !self.sample.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "  Sample reassignments ({} of {}):",
                self.sample.len(),
                re.reassigned
            )?;
            writeln!(
                f,
                "  {:<10} {:<22} {:<18} {:<18} {:>8} {:>8}",
                "id", "name", "from", "to", "km now", "km new"
            )?;
            for s in &self.sample {
                writeln!(
                    f,
                    "  {:<10} {:<22} {:<18} {:<18} {:>8.1} {:>8.1}",
                    s.place_id.as_str(),
                    truncate(&s.name, 22),
                    truncate(&s.from_region, 18),
                    truncate(&s.to_region, 18),
                    s.dist_assigned_km,
                    s.dist_best_km
                )?;
            }
        }
        write!(f, "{:=<64}", "")
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width - 1).collect();
        out.push('~');
        out
    }
}

/// Report plus run metadata, as written by `--report-json`
#[derive(Debug, Serialize)]
pub struct ReportEnvelope<'a, R: Serialize, O: Serialize> {
    pub generated_at: DateTime<Utc>,
    pub tool: &'a str,
    pub report: &'a R,
    pub outcome: &'a O,
}

impl<'a, R: Serialize, O: Serialize> ReportEnvelope<'a, R, O> {
    pub fn new(tool: &'a str, report: &'a R, outcome: &'a O) -> Self {
        Self {
            generated_at: Utc::now(),
            tool,
            report,
            outcome,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self).map_err(std::io::Error::from)?;
        Ok(())
    }
}
