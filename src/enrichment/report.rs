//! Summary of an enrichment run.

use serde::Serialize;
use std::fmt;

use super::{ElevationStats, ReconcileStats};
use crate::gazetteer::GazetteerStats;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichReport {
    pub places_loaded: usize,
    pub located: usize,
    /// Enrichment fields the store was missing
    pub missing_columns: Vec<String>,
    pub gazetteer: Option<GazetteerStats>,
    pub population: Option<ReconcileStats>,
    /// Names of the models consulted, in order
    pub elevation_models: Vec<String>,
    pub elevation: Option<ElevationStats>,
}

impl fmt::Display for EnrichReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:=<64}", "")?;
        writeln!(f, "  Enrichment report")?;
        writeln!(f, "{:=<64}", "")?;
        writeln!(f, "  Places loaded                       : {:>8}", self.places_loaded)?;
        writeln!(f, "  With coordinates                    : {:>8}", self.located)?;
        if !self.missing_columns.is_empty() {
            writeln!(f, "  Missing columns                     : {}", self.missing_columns.join(", "))?;
        }

        if let Some(g) = &self.gazetteer {
            writeln!(f)?;
            writeln!(f, "  Gazetteer lines                     : {:>8}", g.lines)?;
            writeln!(f, "    populated places                  : {:>8}", g.entries)?;
            writeln!(f, "    other features                    : {:>8}", g.other_class)?;
            writeln!(f, "    malformed                         : {:>8}", g.malformed)?;
        }

        if let Some(p) = &self.population {
            writeln!(f)?;
            writeln!(f, "  Entries matched to a place          : {:>8}", p.matched_entries)?;
            writeln!(f, "    superseded by a closer entry      : {:>8}", p.superseded)?;
            writeln!(f, "    equal-distance ties               : {:>8}", p.ties)?;
            writeln!(f, "  Places classified as populated      : {:>8}", p.places_classified)?;
            writeln!(f, "    with population                   : {:>8}", p.with_population)?;
        }

        match &self.elevation {
            Some(e) => {
                writeln!(f)?;
                writeln!(f, "  Elevation ({})", self.elevation_models.join(" -> "))?;
                writeln!(f, "    resolved                          : {:>8}", e.resolved)?;
                writeln!(f, "    unchanged                         : {:>8}", e.unchanged)?;
                writeln!(f, "    to update                         : {:>8}", e.resolved - e.unchanged)?;
                writeln!(f, "    unresolved (kept as is)           : {:>8}", e.unresolved)?;
            }
            None => {
                writeln!(f)?;
                writeln!(f, "  Elevation                           :  skipped")?;
            }
        }
        write!(f, "{:=<64}", "")
    }
}
