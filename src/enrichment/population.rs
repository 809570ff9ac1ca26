//! Population and classification from the gazetteer.
//!
//! Matching is inverse: every gazetteer entry picks the nearest record of
//! its country within the same-place threshold, and a record claimed by
//! several entries keeps the closest one. Records no entry claims end up
//! unclassified, so applying the outcome is a full reset-then-apply.

use hashbrown::HashMap;
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::geo::GridIndex;
use crate::models::{GazetteerEntry, PlaceId, PlaceRecord};
use crate::store::Classification;

/// The gazetteer entry that won a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationMatch {
    pub place_id: PlaceId,
    pub distance_km: f64,
    /// `None` when the entry's population is zero
    pub population: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub entries: usize,
    /// Entries with a record within the threshold
    pub matched_entries: usize,
    /// Entries that lost their record to a closer entry
    pub superseded: usize,
    /// Equal-distance contests, resolved in favour of the later entry
    pub ties: usize,
    pub places_classified: usize,
    pub with_population: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Winning match per record, in id order
    pub matches: Vec<PopulationMatch>,
    pub stats: ReconcileStats,
}

impl ReconcileOutcome {
    pub fn classifications(&self) -> Vec<Classification> {
        self.matches
            .iter()
            .map(|m| Classification {
                place_id: m.place_id.clone(),
                population: m.population,
            })
            .collect()
    }
}

pub struct PopulationReconciler {
    same_place_km: f64,
}

impl PopulationReconciler {
    pub fn new(same_place_km: f64) -> Self {
        Self { same_place_km }
    }

    pub fn reconcile(
        &self,
        places: &[PlaceRecord],
        entries: &[GazetteerEntry],
        pb: &ProgressBar,
    ) -> ReconcileOutcome {
        let index: GridIndex<usize> = GridIndex::build(
            places
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.location.map(|loc| (p.country.as_str(), loc, i))),
        );
        info!(
            "Matching {} gazetteer entries against {} located places in {} countries",
            entries.len(),
            index.len(),
            index.country_count()
        );

        let populated: Vec<&GazetteerEntry> =
            entries.iter().filter(|e| e.is_populated_place()).collect();
        pb.set_length(populated.len() as u64);

        let hits: Vec<Option<(usize, f64)>> = populated
            .par_iter()
            .map(|entry| {
                pb.inc(1);
                index
                    .nearest(entry.location, &entry.country, self.same_place_km)
                    .map(|n| (*n.payload, n.distance_km))
            })
            .collect();
        pb.finish_and_clear();

        let mut stats = ReconcileStats {
            entries: populated.len(),
            ..ReconcileStats::default()
        };
        let mut best: HashMap<usize, (f64, &GazetteerEntry)> = HashMap::new();

        // File order matters for ties, so the fold stays sequential
        for (entry, hit) in populated.iter().zip(hits) {
            let Some((place_idx, d)) = hit else { continue };
            stats.matched_entries += 1;

            match best.get_mut(&place_idx) {
                None => {
                    best.insert(place_idx, (d, *entry));
                }
                Some(current) => {
                    stats.superseded += 1;
                    if d <= current.0 {
                        if d == current.0 {
                            stats.ties += 1;
                        }
                        *current = (d, *entry);
                    }
                }
            }
        }

        let mut matches: Vec<PopulationMatch> = best
            .into_iter()
            .map(|(idx, (distance_km, entry))| PopulationMatch {
                place_id: places[idx].id.clone(),
                distance_km,
                population: entry.known_population(),
            })
            .collect();
        matches.sort_by(|a, b| a.place_id.cmp(&b.place_id));

        stats.places_classified = matches.len();
        stats.with_population = matches.iter().filter(|m| m.population.is_some()).count();
        if stats.ties > 0 {
            debug!("{} equal-distance matches resolved to the later entry", stats.ties);
        }
        info!(
            "  {} places classified ({} with population), {} entries superseded",
            stats.places_classified, stats.with_population, stats.superseded
        );

        ReconcileOutcome { matches, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, RegionRef};

    fn record(id: &str, lat: f64, lon: f64) -> PlaceRecord {
        PlaceRecord::new(
            id,
            format!("Place {}", id),
            "IT",
            RegionRef::new("01", "Piemonte", "piemonte"),
            Some(GeoPoint { lat, lon }),
        )
    }

    fn entry(lat: f64, lon: f64, population: u64) -> GazetteerEntry {
        GazetteerEntry {
            location: GeoPoint { lat, lon },
            country: "IT".to_string(),
            feature_class: "P".to_string(),
            population,
            dem_m: None,
        }
    }

    fn reconcile(places: &[PlaceRecord], entries: &[GazetteerEntry]) -> ReconcileOutcome {
        PopulationReconciler::new(10.0).reconcile(places, entries, &ProgressBar::hidden())
    }

    #[test]
    fn test_nearest_record_is_matched() {
        let places = vec![record("1", 45.07, 7.69), record("2", 45.10, 7.69)];
        let outcome = reconcile(&places, &[entry(45.071, 7.69, 870_000)]);

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].place_id, PlaceId::from("1"));
        assert_eq!(outcome.matches[0].population, Some(870_000));
    }

    #[test]
    fn test_closest_entry_wins_contested_record() {
        let places = vec![record("1", 45.0, 7.0)];
        // Farther entry listed last must not override the closer one
        let entries = [entry(45.01, 7.0, 100), entry(45.05, 7.0, 5000)];
        let outcome = reconcile(&places, &entries);

        assert_eq!(outcome.matches[0].population, Some(100));
        assert_eq!(outcome.stats.matched_entries, 2);
        assert_eq!(outcome.stats.superseded, 1);
        assert_eq!(outcome.stats.ties, 0);
    }

    #[test]
    fn test_tie_goes_to_later_entry() {
        let places = vec![record("1", 45.0, 7.0)];
        let entries = [entry(45.01, 7.0, 100), entry(44.99, 7.0, 200)];
        let outcome = reconcile(&places, &entries);

        assert_eq!(outcome.matches[0].population, Some(200));
        assert_eq!(outcome.stats.ties, 1);
    }

    #[test]
    fn test_record_beyond_threshold_stays_unclassified() {
        // ~15 km from the only entry
        let places = vec![record("1", 45.135, 7.0)];
        let outcome = reconcile(&places, &[entry(45.0, 7.0, 1000)]);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.stats.matched_entries, 0);
    }

    #[test]
    fn test_zero_population_classifies_without_value() {
        let places = vec![record("1", 45.0, 7.0)];
        let outcome = reconcile(&places, &[entry(45.0, 7.0, 0)]);
        assert_eq!(
            outcome.classifications(),
            vec![Classification {
                place_id: PlaceId::from("1"),
                population: None,
            }]
        );
    }

    #[test]
    fn test_other_countries_and_classes_ignored() {
        let places = vec![record("1", 45.0, 7.0)];
        let mut foreign = entry(45.0, 7.0, 10);
        foreign.country = "FR".to_string();
        let mut river = entry(45.0, 7.0, 0);
        river.feature_class = "H".to_string();

        let outcome = reconcile(&places, &[foreign, river]);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.stats.entries, 1);
    }
}
