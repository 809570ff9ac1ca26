//! Duplicate detection before region correction.
//!
//! Records with the same case-folded name and country whose coordinates
//! agree to three decimals (about 100 m) describe the same place. Within a
//! group the survivor is the smallest id when every member is in the same
//! region; otherwise it is the member whose own region's clean centroid is
//! closest to the shared position.

use hashbrown::HashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::geo::{haversine_km, CentroidTable};
use crate::models::{PlaceId, PlaceRecord};

type GroupKey = (String, String, i64, i64);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreDuplicateStats {
    /// Groups with more than one member
    pub groups: usize,
    /// Groups whose members all share one region
    pub same_region: usize,
    /// Groups whose members disagree on the region
    pub different_region: usize,
    /// Ambiguous groups where no member's region had a centroid
    pub no_centroid: usize,
    pub to_delete: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PreDuplicates {
    pub to_delete: BTreeSet<PlaceId>,
    pub stats: PreDuplicateStats,
}

fn rounded(coord: f64) -> i64 {
    (coord * 1000.0).round() as i64
}

pub fn find_pre_duplicates(places: &[PlaceRecord], centroids: &CentroidTable) -> PreDuplicates {
    let mut groups: HashMap<GroupKey, Vec<&PlaceRecord>> = HashMap::new();
    for place in places {
        if !place.is_region_candidate() {
            continue;
        }
        let Some(loc) = place.location else { continue };
        let key = (
            place.normalized_name(),
            place.country.clone(),
            rounded(loc.lat),
            rounded(loc.lon),
        );
        groups.entry(key).or_default().push(place);
    }

    let mut result = PreDuplicates::default();

    for (_, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|a, b| a.id.cmp(&b.id));
        result.stats.groups += 1;

        let same_region = members.iter().all(|p| p.region.id == members[0].region.id);
        let keep = if same_region {
            result.stats.same_region += 1;
            0
        } else {
            result.stats.different_region += 1;
            match closest_region_member(&members, centroids) {
                Some(i) => i,
                None => {
                    result.stats.no_centroid += 1;
                    0
                }
            }
        };

        for (i, member) in members.iter().enumerate() {
            if i != keep {
                result.to_delete.insert(member.id.clone());
            }
        }
        debug!(
            "Duplicate group '{}' ({} members): keeping {}",
            members[keep].name,
            members.len(),
            members[keep].id
        );
    }

    result.stats.to_delete = result.to_delete.len();
    result
}

/// Index of the member whose region centroid is nearest the group position
fn closest_region_member(members: &[&PlaceRecord], centroids: &CentroidTable) -> Option<usize> {
    let anchor = members[0].location?;
    let mut best: Option<(usize, f64)> = None;

    for (i, member) in members.iter().enumerate() {
        let Some(centroid) = centroids.clean(&member.region_key()) else {
            continue;
        };
        let d = haversine_km(anchor, centroid.location);
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}
