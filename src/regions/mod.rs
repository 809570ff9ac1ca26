//! Region correction phases.
//!
//! All phases are pure functions of a loaded snapshot and the centroid table;
//! none of them touches the store.

mod duplicates;
mod overlay;
mod post_duplicates;
mod reassign;

pub use duplicates::{find_pre_duplicates, PreDuplicateStats, PreDuplicates};
pub use overlay::{effective_state, EffectiveView};
pub use post_duplicates::{find_post_duplicates, PostDuplicate, PostDuplicateStats, PostDuplicates};
pub use reassign::{ReassignSkip, ReassignStats, Reassigner, Reassignment, Reassignments, Verdict};
