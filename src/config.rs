//! Pipeline configuration loaded from an optional TOML file.
//!
//! Every distance constant of the pipeline is empirical, so all of them live
//! here instead of in the phases that use them.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::geo::KM_PER_DEGREE;

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub thresholds: Thresholds,
    pub batches: BatchConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Max distance between a gazetteer entry and the record it describes
    pub same_place_km: f64,
    /// Members farther than this from the raw centroid are outliers
    pub centroid_outlier_km: f64,
    /// Records closer than this to their region centroid are accepted as-is
    pub suspicion_km: f64,
    /// The assigned region must be this many times farther than the best one
    pub reassign_ratio: f64,
    /// Same-named records in one region closer than this are duplicates
    pub post_correction_km: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            same_place_km: 10.0,
            centroid_outlier_km: 500.0,
            suspicion_km: 150.0,
            reassign_ratio: 3.0,
            post_correction_km: 50.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub delete_batch: usize,
    pub update_batch: usize,
    /// Attempts per batch before the run stops
    pub max_attempts: u32,
    /// Pause between attempts of the same batch
    pub retry_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            delete_batch: 500,
            update_batch: 2_000,
            max_attempts: 2,
            retry_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Reassignments listed in the human-readable report
    pub sample_size: usize,
}

impl BatchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { sample_size: 20 }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [
            ("same_place_km", t.same_place_km),
            ("centroid_outlier_km", t.centroid_outlier_km),
            ("suspicion_km", t.suspicion_km),
            ("reassign_ratio", t.reassign_ratio),
            ("post_correction_km", t.post_correction_km),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::config(format!(
                    "thresholds.{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if t.reassign_ratio <= 1.0 {
            return Err(Error::config(format!(
                "thresholds.reassign_ratio must be greater than 1, got {}",
                t.reassign_ratio
            )));
        }
        // Grid index queries must stay within one cell of latitude
        if t.same_place_km > KM_PER_DEGREE {
            return Err(Error::config(format!(
                "thresholds.same_place_km must not exceed one grid cell ({:.1} km)",
                KM_PER_DEGREE
            )));
        }

        let b = &self.batches;
        if b.delete_batch == 0 || b.update_batch == 0 {
            return Err(Error::config("batch sizes must be at least 1"));
        }
        if b.max_attempts == 0 {
            return Err(Error::config("batches.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.thresholds.same_place_km, 10.0);
        assert_eq!(config.thresholds.centroid_outlier_km, 500.0);
        assert_eq!(config.thresholds.suspicion_km, 150.0);
        assert_eq!(config.thresholds.reassign_ratio, 3.0);
        assert_eq!(config.thresholds.post_correction_km, 50.0);
        assert_eq!(config.batches.delete_batch, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[thresholds]\nsuspicion_km = 200.0\n\n[batches]\nmax_attempts = 3").unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.thresholds.suspicion_km, 200.0);
        assert_eq!(config.thresholds.reassign_ratio, 3.0);
        assert_eq!(config.batches.max_attempts, 3);
        assert_eq!(config.report.sample_size, 20);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = Config::default();
        config.thresholds.reassign_ratio = 0.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.thresholds.same_place_km = 150.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.batches.update_batch = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[thresholds]\nsuspicious_km = 200.0").unwrap();
        assert!(Config::load_from_file(file.path()).is_err());
    }
}
