//! Detection of geometrically implausible region assignments.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::config::Thresholds;
use crate::geo::{haversine_km, CentroidTable};
use crate::models::{PlaceId, PlaceRecord, RegionRef};

/// A proposed region change, with both distances for audit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reassignment {
    pub place_id: PlaceId,
    pub name: String,
    pub country: String,
    pub from: RegionRef,
    pub to: RegionRef,
    /// Distance to the assigned region's clean centroid
    pub dist_assigned_km: f64,
    /// Distance to the nearest other region's clean centroid
    pub dist_best_km: f64,
}

/// Why a suspicious record could not be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReassignSkip {
    /// The assigned region has no clean centroid
    NoCentroidAvailable,
    /// No other region of the country has a clean centroid
    NoAlternateRegion,
}

impl fmt::Display for ReassignSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReassignSkip::NoCentroidAvailable => "no centroid for assigned region",
            ReassignSkip::NoAlternateRegion => "no alternate region in country",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Within the suspicion distance of the assigned centroid
    Accepted,
    /// Suspicious, but the best alternative is not decisively closer
    BelowRatio { dist_assigned_km: f64, dist_best_km: f64 },
    Reassign(Reassignment),
    Skipped(ReassignSkip),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReassignStats {
    pub examined: usize,
    pub accepted: usize,
    pub below_ratio: usize,
    pub reassigned: usize,
    pub no_centroid: usize,
    pub no_alternate: usize,
}

impl ReassignStats {
    fn record(&mut self, verdict: &Verdict) {
        self.examined += 1;
        match verdict {
            Verdict::Accepted => self.accepted += 1,
            Verdict::BelowRatio { .. } => self.below_ratio += 1,
            Verdict::Reassign(_) => self.reassigned += 1,
            Verdict::Skipped(ReassignSkip::NoCentroidAvailable) => self.no_centroid += 1,
            Verdict::Skipped(ReassignSkip::NoAlternateRegion) => self.no_alternate += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reassignments {
    /// In place id order
    pub items: Vec<Reassignment>,
    pub stats: ReassignStats,
}

/// Ratio test against the nearest alternative region.
///
/// A record is moved only when it is at least `suspicion_km` from its own
/// centroid and more than `ratio` times farther from it than from the
/// nearest other region of the same country.
#[derive(Debug, Clone, Copy)]
pub struct Reassigner {
    suspicion_km: f64,
    ratio: f64,
}

impl Reassigner {
    pub fn new(suspicion_km: f64, ratio: f64) -> Self {
        Self { suspicion_km, ratio }
    }

    pub fn from_thresholds(t: &Thresholds) -> Self {
        Self::new(t.suspicion_km, t.reassign_ratio)
    }

    pub fn evaluate(&self, place: &PlaceRecord, centroids: &CentroidTable) -> Verdict {
        let assigned = centroids.clean(&place.region_key());
        let (Some(location), Some(assigned)) = (place.location, assigned) else {
            return Verdict::Skipped(ReassignSkip::NoCentroidAvailable);
        };

        let dist_assigned_km = haversine_km(location, assigned.location);
        if dist_assigned_km < self.suspicion_km {
            return Verdict::Accepted;
        }

        let best = centroids.nearest_other(&place.country, &place.region.id, location);
        let Some((best_region, dist_best_km)) = best else {
            return Verdict::Skipped(ReassignSkip::NoAlternateRegion);
        };

        if !(dist_assigned_km > self.ratio * dist_best_km) {
            return Verdict::BelowRatio {
                dist_assigned_km,
                dist_best_km,
            };
        }

        Verdict::Reassign(Reassignment {
            place_id: place.id.clone(),
            name: place.name.clone(),
            country: place.country.clone(),
            from: place.region.clone(),
            to: best_region.clone(),
            dist_assigned_km,
            dist_best_km,
        })
    }

    /// Evaluate every record not already marked for deletion
    pub fn find(
        &self,
        places: &[PlaceRecord],
        deleted: &BTreeSet<PlaceId>,
        centroids: &CentroidTable,
    ) -> Reassignments {
        let mut result = Reassignments::default();

        for place in places {
            if deleted.contains(&place.id) || place.location.is_none() {
                continue;
            }
            let verdict = self.evaluate(place, centroids);
            result.stats.record(&verdict);

            match verdict {
                Verdict::Reassign(r) => {
                    debug!(
                        "{} '{}': {} -> {} ({:.1} km vs {:.1} km)",
                        r.place_id, r.name, r.from.id, r.to.id, r.dist_assigned_km, r.dist_best_km
                    );
                    result.items.push(r);
                }
                Verdict::Skipped(reason) => debug!(
                    "{} '{}' skipped: {} (raw centroid {:?})",
                    place.id,
                    place.name,
                    reason,
                    centroids.raw(&place.region_key())
                ),
                _ => {}
            }
        }

        result.items.sort_by(|a, b| a.place_id.cmp(&b.place_id));
        result
    }
}
