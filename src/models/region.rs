//! Administrative region references and grouping keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Region assignment carried by a place record
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionRef {
    /// Region identifier, unique within a country
    pub id: String,
    /// Display name (e.g. "Piemonte")
    pub name: String,
    /// Normalized slug (e.g. "piemonte")
    pub slug: String,
}

impl RegionRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            slug: slug.into(),
        }
    }

    /// Whether the record is assigned to any region at all
    pub fn is_assigned(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Grouping key for a region: regions are only unique within a country.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionKey {
    pub country: String,
    pub region_id: String,
}

impl RegionKey {
    pub fn new(country: impl Into<String>, region_id: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            region_id: region_id.into(),
        }
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.country, self.region_id)
    }
}
