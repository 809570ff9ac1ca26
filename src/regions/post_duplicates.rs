//! Duplicate detection against the simulated post-correction state.
//!
//! Moving a record into another region can land it next to a same-named
//! record already there. Within each (name, country, effective region)
//! group the smallest id is kept and every other member closer to it than
//! the threshold is proposed for deletion.

use hashbrown::HashMap;
use serde::Serialize;
use std::collections::BTreeSet;

use super::EffectiveView;
use crate::geo::haversine_km;
use crate::models::{PlaceId, PlaceRecord};

/// A record that duplicates a kept one once corrections are applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDuplicate {
    pub place_id: PlaceId,
    pub kept_id: PlaceId,
    pub name: String,
    pub region_id: String,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostDuplicateStats {
    /// Same-named groups sharing an effective region
    pub groups: usize,
    /// Groups with at least one member within the threshold
    pub groups_with_duplicates: usize,
    pub to_delete: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PostDuplicates {
    pub pairs: Vec<PostDuplicate>,
    pub to_delete: BTreeSet<PlaceId>,
    pub stats: PostDuplicateStats,
}

/// `excluded` holds records already proposed for deletion
pub fn find_post_duplicates(
    view: &EffectiveView<'_>,
    excluded: &BTreeSet<PlaceId>,
    threshold_km: f64,
) -> PostDuplicates {
    let mut groups: HashMap<(String, String, String), Vec<&PlaceRecord>> = HashMap::new();
    for (place, region) in view.iter() {
        // Unassigned records share the empty region id without sharing a region
        if excluded.contains(&place.id) || place.name.is_empty() || !region.is_assigned() {
            continue;
        }
        let key = (place.normalized_name(), place.country.clone(), region.id.clone());
        groups.entry(key).or_default().push(place);
    }

    let mut result = PostDuplicates::default();

    for ((_, _, region_id), mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        result.stats.groups += 1;
        members.sort_by(|a, b| a.id.cmp(&b.id));

        let kept = members[0];
        let Some(kept_loc) = kept.location else { continue };

        let mut found = false;
        for member in &members[1..] {
            let Some(loc) = member.location else { continue };
            let distance_km = haversine_km(kept_loc, loc);
            if distance_km < threshold_km {
                found = true;
                result.to_delete.insert(member.id.clone());
                result.pairs.push(PostDuplicate {
                    place_id: member.id.clone(),
                    kept_id: kept.id.clone(),
                    name: member.name.clone(),
                    region_id: region_id.clone(),
                    distance_km,
                });
            }
        }
        if found {
            result.stats.groups_with_duplicates += 1;
        }
    }

    result.pairs.sort_by(|a, b| a.place_id.cmp(&b.place_id));
    result.stats.to_delete = result.to_delete.len();
    result
}
