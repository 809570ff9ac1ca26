//! SQLite place store over the `cities` table.

use hashbrown::HashSet;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, Row};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{BackupLocation, Classification, ElevationUpdate, PlaceQuery, PlaceStore, RegionUpdate};
use crate::error::{Error, Result};
use crate::models::{GeoPoint, PlaceId, PlaceRecord, RegionRef};

/// Columns added by schema evolution, with their SQL type
const ENRICHMENT_COLUMNS: [(&str, &str); 3] = [
    ("population", "INTEGER"),
    ("elevation_m", "INTEGER"),
    ("is_populated", "INTEGER NOT NULL DEFAULT 0"),
];

/// SQLite bind-parameter budget per statement
const MAX_PARAMS: usize = 900;

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open an existing database produced by the import step
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(Error::unavailable(
                "place store",
                format!("{} does not exist", path.display()),
            ));
        }
        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        let store = Self { conn, path };
        if store.columns()?.is_empty() {
            return Err(Error::unavailable(
                "place store",
                format!("{} has no cities table", store.path.display()),
            ));
        }
        info!("Opened place store {}", store.path.display());
        Ok(store)
    }

    /// Create a database with the base `cities` layout (no enrichment columns)
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cities (
                cityid        TEXT PRIMARY KEY,
                regionid      TEXT,
                countrycode   TEXT,
                stateprovince TEXT,
                cityname      TEXT,
                latitude      REAL,
                longitude     REAL,
                slug_region   TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_coords ON cities(latitude, longitude);",
        )?;
        Ok(Self { conn, path })
    }

    /// Insert a record as the import step would; enrichment fields are
    /// written only when their columns exist.
    pub fn insert(&mut self, place: &PlaceRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO cities (cityid, regionid, countrycode, stateprovince, cityname,
                                 latitude, longitude, slug_region)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                place.id.as_str(),
                place.region.id,
                place.country,
                place.region.name,
                place.name,
                place.location.map(|p| p.lat),
                place.location.map(|p| p.lon),
                place.region.slug,
            ],
        )?;
        if self.missing_enrichment_columns()?.is_empty() {
            self.conn.execute(
                "UPDATE cities SET population = ?1, elevation_m = ?2, is_populated = ?3
                 WHERE cityid = ?4",
                params![
                    place.population.map(|p| p as i64),
                    place.elevation_m,
                    place.is_populated,
                    place.id.as_str(),
                ],
            )?;
        }
        Ok(())
    }

    fn columns(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(cities)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    /// Enrichment columns `ensure_schema` would add
    pub fn missing_enrichment_columns(&self) -> Result<Vec<String>> {
        let columns = self.columns()?;
        Ok(ENRICHMENT_COLUMNS
            .iter()
            .filter(|(name, _)| !columns.contains(*name))
            .map(|(name, _)| name.to_string())
            .collect())
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }
}

impl PlaceStore for SqliteStore {
    fn ensure_schema(&mut self) -> Result<Vec<String>> {
        let existing = self.columns()?;
        let mut added = Vec::new();

        let tx = self.conn.transaction()?;
        for (name, sql_type) in ENRICHMENT_COLUMNS {
            if !existing.contains(name) {
                tx.execute_batch(&format!("ALTER TABLE cities ADD COLUMN {} {}", name, sql_type))?;
                info!("Added column {}", name);
                added.push(name.to_string());
            }
        }
        tx.commit()?;
        Ok(added)
    }

    fn load_places(&self, query: &PlaceQuery) -> Result<Vec<PlaceRecord>> {
        let columns = self.columns()?;
        // Missing enrichment columns read as NULL so dry runs never touch the schema
        let optional = |name: &str| {
            if columns.contains(name) {
                name.to_string()
            } else {
                format!("NULL AS {}", name)
            }
        };
        let sql = format!(
            "SELECT cityid, cityname, countrycode, regionid, stateprovince, slug_region,
                    latitude, longitude, {}, {}, {}
             FROM cities",
            optional("population"),
            optional("elevation_m"),
            optional("is_populated"),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut places = Vec::new();
        let mut invalid_coordinates = 0usize;
        let mut missing_id = 0usize;

        while let Some(row) = rows.next()? {
            let Some(id) = id_from_value(row.get(0)?) else {
                missing_id += 1;
                continue;
            };
            let (place, had_bad_coords) = place_from_row(id, row)?;
            if had_bad_coords {
                invalid_coordinates += 1;
            }
            if query.matches(&place) {
                places.push(place);
            }
        }

        if invalid_coordinates > 0 {
            warn!("{} records have out-of-range coordinates, treated as unlocated", invalid_coordinates);
        }
        if missing_id > 0 {
            warn!("Skipped {} records without an identifier", missing_id);
        }
        debug!("Loaded {} records matching {:?}", places.len(), query);
        Ok(places)
    }

    fn apply_classification(&mut self, classified: &[Classification]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("UPDATE cities SET population = NULL, is_populated = 0", [])?;
        {
            let mut stmt =
                tx.prepare("UPDATE cities SET population = ?1, is_populated = 1 WHERE cityid = ?2")?;
            for c in classified {
                stmt.execute(params![c.population.map(|p| p as i64), c.place_id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn update_elevations(&mut self, batch: &[ElevationUpdate]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare("UPDATE cities SET elevation_m = ?1 WHERE cityid = ?2")?;
            for u in batch {
                updated += stmt.execute(params![u.elevation_m, u.place_id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    fn update_regions(&mut self, batch: &[RegionUpdate]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE cities SET regionid = ?1, stateprovince = ?2, slug_region = ?3
                 WHERE cityid = ?4",
            )?;
            for u in batch {
                updated += stmt.execute(params![
                    u.region.id,
                    u.region.name,
                    u.region.slug,
                    u.place_id.as_str()
                ])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    fn delete_places(&mut self, ids: &[PlaceId]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        for chunk in ids.chunks(MAX_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("DELETE FROM cities WHERE cityid IN ({})", placeholders);
            deleted += tx.execute(&sql, params_from_iter(chunk.iter().map(PlaceId::as_str)))?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn backup(&self) -> Result<BackupLocation> {
        // Fold any WAL content into the main file before copying it
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        let target = self.backup_path();
        fs::copy(&self.path, &target)?;
        info!("Backup written to {}", target.display());
        Ok(BackupLocation::File(target))
    }
}

fn id_from_value(value: Value) -> Option<PlaceId> {
    match value {
        Value::Text(s) if !s.trim().is_empty() => Some(PlaceId::new(s.trim())),
        Value::Integer(i) => Some(PlaceId::new(i.to_string())),
        _ => None,
    }
}

fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

/// Build a record from a `load_places` row; the flag reports coordinates
/// that were present but out of range.
fn place_from_row(id: PlaceId, row: &Row<'_>) -> Result<(PlaceRecord, bool)> {
    let lat: Option<f64> = row.get(6)?;
    let lon: Option<f64> = row.get(7)?;
    let location = match (lat, lon) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
        _ => None,
    };
    let bad_coords = lat.is_some() && lon.is_some() && location.is_none();

    let region = RegionRef::new(text(row, 3)?, text(row, 4)?, text(row, 5)?);
    let mut place = PlaceRecord::new(id, text(row, 1)?, &text(row, 2)?, region, location);

    place.population = row
        .get::<_, Option<i64>>(8)?
        .and_then(|p| u64::try_from(p).ok());
    place.elevation_m = row
        .get::<_, Option<i64>>(9)?
        .and_then(|e| i32::try_from(e).ok());
    place.is_populated = row.get::<_, Option<i64>>(10)?.unwrap_or(0) != 0;

    Ok((place, bad_coords))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, lat: f64, lon: f64) -> PlaceRecord {
        PlaceRecord::new(
            id,
            format!("City {}", id),
            "it",
            RegionRef::new("PIE", "Piemonte", "piemonte"),
            GeoPoint::new(lat, lon),
        )
    }

    fn fresh_store(dir: &tempfile::TempDir) -> SqliteStore {
        let mut store = SqliteStore::create(dir.path().join("cities.db")).unwrap();
        store.insert(&sample("1", 45.07, 7.69)).unwrap();
        store.insert(&sample("2", 45.46, 9.19)).unwrap();
        store
            .insert(&PlaceRecord::new("3", "Nowhere", "IT", RegionRef::default(), None))
            .unwrap();
        store
    }

    #[test]
    fn test_open_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteStore::open(dir.path().join("missing.db")).err().unwrap();
        assert!(matches!(err, Error::ExternalSourceUnavailable { .. }));
    }

    #[test]
    fn test_load_without_enrichment_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = fresh_store(&dir);

        let located = store.load_places(&PlaceQuery::located()).unwrap();
        assert_eq!(located.len(), 2);
        assert_eq!(located[0].country, "IT");
        assert_eq!(located[0].region.slug, "piemonte");
        assert!(located.iter().all(|p| p.population.is_none() && !p.is_populated));

        assert_eq!(store.load_places(&PlaceQuery::all()).unwrap().len(), 3);
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = fresh_store(&dir);

        assert_eq!(store.missing_enrichment_columns().unwrap().len(), 3);
        let added = store.ensure_schema().unwrap();
        assert_eq!(added, vec!["population", "elevation_m", "is_populated"]);
        assert!(store.missing_enrichment_columns().unwrap().is_empty());
        assert!(store.ensure_schema().unwrap().is_empty());
    }

    #[test]
    fn test_classification_resets_then_applies() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = fresh_store(&dir);
        store.ensure_schema().unwrap();

        store
            .apply_classification(&[Classification {
                place_id: PlaceId::from("1"),
                population: Some(870_000),
            }])
            .unwrap();
        store
            .apply_classification(&[Classification {
                place_id: PlaceId::from("2"),
                population: None,
            }])
            .unwrap();

        let places = store.load_places(&PlaceQuery::all()).unwrap();
        let by_id = |id: &str| places.iter().find(|p| p.id.as_str() == id).unwrap();
        assert!(!by_id("1").is_populated);
        assert_eq!(by_id("1").population, None);
        assert!(by_id("2").is_populated);
        assert_eq!(by_id("2").population, None);

        let populated = store.load_places(&PlaceQuery::all().populated(true)).unwrap();
        assert_eq!(populated.len(), 1);
    }

    #[test]
    fn test_updates_deletes_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = fresh_store(&dir);
        store.ensure_schema().unwrap();

        let n = store
            .update_elevations(&[ElevationUpdate {
                place_id: PlaceId::from("1"),
                elevation_m: 239,
            }])
            .unwrap();
        assert_eq!(n, 1);

        let n = store
            .update_regions(&[RegionUpdate {
                place_id: PlaceId::from("2"),
                region: RegionRef::new("LOM", "Lombardia", "lombardia"),
            }])
            .unwrap();
        assert_eq!(n, 1);

        let backup = store.backup().unwrap();
        assert_eq!(backup, BackupLocation::File(dir.path().join("cities.db.bak")));

        let deleted = store
            .delete_places(&[PlaceId::from("3"), PlaceId::from("99")])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count().unwrap(), 2);

        let places = store.load_places(&PlaceQuery::located()).unwrap();
        assert_eq!(places[0].elevation_m, Some(239));
        assert_eq!(places[1].region.name, "Lombardia");

        let backup_store = SqliteStore::open(dir.path().join("cities.db.bak")).unwrap();
        assert_eq!(backup_store.count().unwrap(), 3);
    }
}
