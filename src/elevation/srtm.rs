//! SRTM `.hgt` tiles, memory mapped on demand.
//!
//! A tile covers one degree square. Its file name is its south-west corner
//! (`N45E007.hgt`) and it holds `n * n` big-endian `i16` samples in row-major
//! order, north row first. `n` is derived from the file size, so SRTM1
//! (3601) and SRTM3 (1201) tiles can be mixed in one directory.

use hashbrown::HashMap;
use memmap2::Mmap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use super::ElevationModel;
use crate::error::{Error, Result};
use crate::models::GeoPoint;

const VOID: i16 = -32768;

struct Tile {
    data: Mmap,
    size: usize,
}

impl Tile {
    fn open(path: &Path) -> Result<Option<Tile>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // SAFETY: tiles are read-only inputs, not modified while the run lasts
        let data = unsafe { Mmap::map(&file)? };

        let samples = data.len() / 2;
        let size = (samples as f64).sqrt().round() as usize;
        if size < 2 || size * size * 2 != data.len() {
            warn!("Ignoring {}: {} bytes is not a square grid of samples", path.display(), data.len());
            return Ok(None);
        }
        Ok(Some(Tile { data, size }))
    }

    /// Nearest sample to `point`; the tile's south-west corner is `(lat0, lon0)`
    fn sample(&self, point: GeoPoint, lat0: i32, lon0: i32) -> Option<i32> {
        let last = (self.size - 1) as f64;
        let row = ((f64::from(lat0) + 1.0 - point.lat) * last).round().clamp(0.0, last) as usize;
        let col = ((point.lon - f64::from(lon0)) * last).round().clamp(0.0, last) as usize;

        let offset = (row * self.size + col) * 2;
        let value = i16::from_be_bytes([self.data[offset], self.data[offset + 1]]);
        (value != VOID).then_some(i32::from(value))
    }
}

/// File name of the tile containing the corner `(lat0, lon0)`
pub fn tile_name(lat0: i32, lon0: i32) -> String {
    format!(
        "{}{:02}{}{:03}.hgt",
        if lat0 >= 0 { 'N' } else { 'S' },
        lat0.unsigned_abs(),
        if lon0 >= 0 { 'E' } else { 'W' },
        lon0.unsigned_abs()
    )
}

/// Directory of SRTM tiles; each tile is opened once and cached, missing
/// tiles included
pub struct SrtmTiles {
    dir: PathBuf,
    tiles: RwLock<HashMap<(i32, i32), Option<Arc<Tile>>>>,
}

impl SrtmTiles {
    pub fn open(dir: &Path) -> Result<Self> {
        let listing = fs::read_dir(dir)
            .map_err(|e| Error::unavailable("srtm", format!("cannot read {}: {}", dir.display(), e)))?;

        let available = listing
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext.eq_ignore_ascii_case("hgt")))
            .count();
        if available == 0 {
            return Err(Error::unavailable(
                "srtm",
                format!("no .hgt tiles in {}", dir.display()),
            ));
        }
        info!("SRTM: {} tiles available in {}", available, dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            tiles: RwLock::new(HashMap::new()),
        })
    }

    fn tile(&self, lat0: i32, lon0: i32) -> Option<Arc<Tile>> {
        if let Ok(cache) = self.tiles.read() {
            if let Some(cached) = cache.get(&(lat0, lon0)) {
                return cached.clone();
            }
        }

        let path = self.dir.join(tile_name(lat0, lon0));
        let tile = match Tile::open(&path) {
            Ok(tile) => tile.map(Arc::new),
            Err(e) => {
                warn!("Cannot map {}: {}", path.display(), e);
                None
            }
        };
        if tile.is_none() {
            debug!("No usable SRTM tile {}", path.display());
        }

        match self.tiles.write() {
            Ok(mut cache) => cache.entry((lat0, lon0)).or_insert(tile).clone(),
            Err(_) => tile,
        }
    }
}

impl ElevationModel for SrtmTiles {
    fn name(&self) -> &str {
        "srtm"
    }

    fn lookup(&self, point: GeoPoint, _country: &str) -> Option<i32> {
        let lat0 = point.lat.floor() as i32;
        let lon0 = point.lon.floor() as i32;
        self.tile(lat0, lon0)?.sample(point, lat0, lon0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x3 tile, values listed north row first
    fn write_tile(dir: &Path, name: &str, values: [i16; 9]) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        fs::write(dir.join(name), bytes).unwrap();
    }

    #[test]
    fn test_tile_names() {
        assert_eq!(tile_name(45, 7), "N45E007.hgt");
        assert_eq!(tile_name(-23, -47), "S23W047.hgt");
        assert_eq!(tile_name(0, -1), "N00W001.hgt");
    }

    #[test]
    fn test_nearest_sample_lookup() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(dir.path(), "N45E007.hgt", [100, 200, 300, 400, 500, 600, 700, 800, VOID]);
        let srtm = SrtmTiles::open(dir.path()).unwrap();

        // North-west corner
        assert_eq!(srtm.lookup(GeoPoint { lat: 45.99, lon: 7.01 }, "IT"), Some(100));
        // Centre
        assert_eq!(srtm.lookup(GeoPoint { lat: 45.5, lon: 7.5 }, "IT"), Some(500));
        // North-east corner
        assert_eq!(srtm.lookup(GeoPoint { lat: 45.9, lon: 7.9 }, "IT"), Some(300));
        // South-west corner
        assert_eq!(srtm.lookup(GeoPoint { lat: 45.1, lon: 7.1 }, "IT"), Some(700));
        // South-east sample is void
        assert_eq!(srtm.lookup(GeoPoint { lat: 45.01, lon: 7.99 }, "IT"), None);
    }

    #[test]
    fn test_missing_and_malformed_tiles() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(dir.path(), "N45E007.hgt", [1; 9]);
        fs::write(dir.path().join("N46E007.hgt"), [0u8; 7]).unwrap();
        let srtm = SrtmTiles::open(dir.path()).unwrap();

        assert_eq!(srtm.lookup(GeoPoint { lat: 10.0, lon: 10.0 }, "XX"), None);
        assert_eq!(srtm.lookup(GeoPoint { lat: 46.5, lon: 7.5 }, "IT"), None);
        // Cached negative result stays negative
        assert_eq!(srtm.lookup(GeoPoint { lat: 10.5, lon: 10.5 }, "XX"), None);
    }

    #[test]
    fn test_unreadable_directory_is_unavailable() {
        let err = SrtmTiles::open(Path::new("/nonexistent/srtm")).err().unwrap();
        assert!(matches!(err, Error::ExternalSourceUnavailable { .. }));

        let empty = tempfile::tempdir().unwrap();
        assert!(SrtmTiles::open(empty.path()).is_err());
    }
}
