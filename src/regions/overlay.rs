//! Simulated post-correction state.

use hashbrown::HashMap;

use super::Reassignment;
use crate::models::{PlaceId, PlaceRecord, RegionRef};

/// Read-only view of a snapshot with pending reassignments layered on top.
///
/// The base records are never modified.
pub struct EffectiveView<'a> {
    base: &'a [PlaceRecord],
    pending: HashMap<&'a PlaceId, &'a RegionRef>,
}

/// Overlay `pending` region changes on `base` without mutating it
pub fn effective_state<'a>(base: &'a [PlaceRecord], pending: &'a [Reassignment]) -> EffectiveView<'a> {
    EffectiveView {
        base,
        pending: pending.iter().map(|r| (&r.place_id, &r.to)).collect(),
    }
}

impl<'a> EffectiveView<'a> {
    /// Region the record will have once pending changes are applied
    pub fn region_of(&self, place: &'a PlaceRecord) -> &'a RegionRef {
        self.pending.get(&place.id).copied().unwrap_or(&place.region)
    }

    /// Every base record paired with its effective region
    pub fn iter(&self) -> impl Iterator<Item = (&'a PlaceRecord, &'a RegionRef)> + '_ {
        self.base.iter().map(move |p| (p, self.region_of(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions::fixtures::{place, region};

    #[test]
    fn test_overlay_does_not_touch_base() {
        let base = vec![place("1", "A", "X", 0.0, 0.0), place("2", "B", "X", 0.0, 1.0)];
        let before = base.clone();
        let pending = vec![Reassignment {
            place_id: PlaceId::from("2"),
            name: "B".to_string(),
            country: "XX".to_string(),
            from: region("X"),
            to: region("Y"),
            dist_assigned_km: 400.0,
            dist_best_km: 50.0,
        }];

        let view = effective_state(&base, &pending);
        let regions: Vec<&str> = view.iter().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(regions, vec!["X", "Y"]);
        assert_eq!(view.region_of(&base[1]).id, "Y");
        assert_eq!(view.region_of(&base[0]), &base[0].region);

        drop(view);
        assert_eq!(base, before);
    }
}
