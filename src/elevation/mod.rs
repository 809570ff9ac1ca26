//! Elevation models and the fallback chain used by the annotator.

mod dem;
mod srtm;

pub use dem::GazetteerDem;
pub use srtm::{tile_name, SrtmTiles};

use crate::models::GeoPoint;

/// Point elevation source.
///
/// `country` is a hint for models built from per-country data; terrain
/// models ignore it.
pub trait ElevationModel: Send + Sync {
    fn name(&self) -> &str;

    /// Elevation in meters, `None` when the point cannot be resolved
    fn lookup(&self, point: GeoPoint, country: &str) -> Option<i32>;
}

impl<M: ElevationModel + ?Sized> ElevationModel for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn lookup(&self, point: GeoPoint, country: &str) -> Option<i32> {
        (**self).lookup(point, country)
    }
}

/// Ordered list of models; the first one with a value wins
#[derive(Default)]
pub struct ElevationChain {
    models: Vec<Box<dyn ElevationModel>>,
}

impl ElevationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model: impl ElevationModel + 'static) -> Self {
        self.models.push(Box::new(model));
        self
    }

    /// Names of the chained models, in lookup order
    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name()).collect()
    }
}

impl ElevationModel for ElevationChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn lookup(&self, point: GeoPoint, country: &str) -> Option<i32> {
        self.models.iter().find_map(|m| m.lookup(point, country))
    }
}
