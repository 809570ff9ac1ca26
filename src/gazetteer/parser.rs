//! Parser for the tab-delimited GeoNames dump (`cities500.txt`).

use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use hashbrown::HashSet;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error as ThisError;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{GazetteerEntry, GeoPoint};

// schema (0-based)
// 0: geonameid  1: name  2: asciiname  3: alternatenames
// 4: latitude  5: longitude  6: feature class  7: feature code
// 8: country code  9: cc2  10-13: admin codes
// 14: population  15: elevation  16: dem  17: timezone  18: modification date
const LAT: usize = 4;
const LON: usize = 5;
const FEATURE_CLASS: usize = 6;
const COUNTRY: usize = 8;
const POPULATION: usize = 14;
const DEM: usize = 16;

/// Lines with fewer fields are malformed
pub const MIN_FIELDS: usize = 17;

/// GeoNames marker for "no DEM data" (sea, voids)
const DEM_NO_DATA: i32 = -9999;

/// Why a gazetteer line was skipped
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum GazetteerLineError {
    #[error("expected at least {MIN_FIELDS} fields, found {0}")]
    TooFewFields(usize),
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("coordinates out of range: {lat}, {lon}")]
    OutOfRange { lat: f64, lon: f64 },
    #[error("line is not valid UTF-8")]
    Encoding,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GazetteerStats {
    pub lines: usize,
    /// Lines failing shape or type checks
    pub malformed: usize,
    /// Well-formed lines for features other than populated places
    pub other_class: usize,
    pub entries: usize,
    pub countries: usize,
}

/// Populated-place entries of a dump
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    pub entries: Vec<GazetteerEntry>,
    pub stats: GazetteerStats,
}

impl Gazetteer {
    /// A dump without a single populated place cannot drive classification:
    /// reconciling against it would reset every record.
    pub fn ensure_usable(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::unavailable(
                "gazetteer",
                format!(
                    "no populated places in {} lines ({} malformed)",
                    self.stats.lines, self.stats.malformed
                ),
            ));
        }
        Ok(())
    }
}

/// Load a dump from disk; `.gz` files are decompressed on the fly
pub fn load_gazetteer(path: &Path) -> Result<Gazetteer> {
    info!("Loading gazetteer from {}", path.display());

    let file = File::open(path).map_err(|e| {
        Error::unavailable("gazetteer", format!("cannot open {}: {}", path.display(), e))
    })?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let gazetteer = read_gazetteer(reader)?;
    info!(
        "  {} populated places ({} countries), {} other features, {} malformed lines",
        gazetteer.stats.entries,
        gazetteer.stats.countries,
        gazetteer.stats.other_class,
        gazetteer.stats.malformed
    );
    Ok(gazetteer)
}

/// Parse a dump, keeping populated places only.
///
/// Malformed lines are counted and skipped; I/O errors abort.
pub fn read_gazetteer<R: Read>(reader: R) -> Result<Gazetteer> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(reader);

    let mut gazetteer = Gazetteer::default();
    let mut countries = HashSet::new();

    for (line_no, result) in csv_reader.records().enumerate() {
        gazetteer.stats.lines += 1;

        let parsed = match result {
            Ok(record) => parse_record(&record),
            Err(e) if e.is_io_error() => return Err(Error::Csv(e)),
            Err(_) => Err(GazetteerLineError::Encoding),
        };

        match parsed {
            Ok(entry) if entry.is_populated_place() => {
                countries.insert(entry.country.clone());
                gazetteer.entries.push(entry);
            }
            Ok(_) => gazetteer.stats.other_class += 1,
            Err(e) => {
                gazetteer.stats.malformed += 1;
                debug!("Skipping gazetteer line {}: {}", line_no + 1, e);
            }
        }
    }

    gazetteer.stats.entries = gazetteer.entries.len();
    gazetteer.stats.countries = countries.len();
    Ok(gazetteer)
}

/// Parse one dump line regardless of its feature class
pub fn parse_record(record: &StringRecord) -> std::result::Result<GazetteerEntry, GazetteerLineError> {
    if record.len() < MIN_FIELDS {
        return Err(GazetteerLineError::TooFewFields(record.len()));
    }

    let lat: f64 = parse_field(record, LAT, "latitude")?;
    let lon: f64 = parse_field(record, LON, "longitude")?;
    let location = GeoPoint::new(lat, lon).ok_or(GazetteerLineError::OutOfRange { lat, lon })?;

    let population = match record[POPULATION].trim() {
        "" => 0,
        _ => parse_field(record, POPULATION, "population")?,
    };
    let dem_m = match record[DEM].trim() {
        "" => None,
        _ => Some(parse_field::<i32>(record, DEM, "dem")?).filter(|&d| d != DEM_NO_DATA),
    };

    Ok(GazetteerEntry {
        location,
        country: record[COUNTRY].trim().to_uppercase(),
        feature_class: record[FEATURE_CLASS].trim().to_string(),
        population,
        dem_m,
    })
}

fn parse_field<T: std::str::FromStr>(
    record: &StringRecord,
    idx: usize,
    field: &'static str,
) -> std::result::Result<T, GazetteerLineError> {
    let raw = record[idx].trim();
    raw.parse().map_err(|_| GazetteerLineError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn line(lat: &str, lon: &str, class: &str, cc: &str, pop: &str, dem: &str) -> String {
        format!(
            "1\tName\tName\t\t{lat}\t{lon}\t{class}\tPPL\t{cc}\t\t01\t\t\t\t{pop}\t\t{dem}\tEurope/Rome\t2024-01-01\n"
        )
    }

    #[test]
    fn test_parses_populated_place() {
        let data = line("45.07049", "7.68682", "P", "it", "870456", "239");
        let gazetteer = read_gazetteer(data.as_bytes()).unwrap();

        assert_eq!(gazetteer.entries.len(), 1);
        let entry = &gazetteer.entries[0];
        assert_eq!(entry.country, "IT");
        assert_eq!(entry.population, 870_456);
        assert_eq!(entry.dem_m, Some(239));
        assert!((entry.location.lat - 45.07049).abs() < 1e-9);
        assert_eq!(gazetteer.stats.countries, 1);
    }

    #[test]
    fn test_empty_population_and_dem() {
        let data = line("45.0", "7.0", "P", "IT", "", "");
        let entry = &read_gazetteer(data.as_bytes()).unwrap().entries[0];
        assert_eq!(entry.population, 0);
        assert_eq!(entry.known_population(), None);
        assert_eq!(entry.dem_m, None);
    }

    #[test]
    fn test_dem_no_data_is_absent() {
        let data = line("45.0", "7.0", "P", "IT", "10", "-9999");
        assert_eq!(read_gazetteer(data.as_bytes()).unwrap().entries[0].dem_m, None);
    }

    #[test]
    fn test_malformed_lines_are_counted_not_fatal() {
        let mut data = String::new();
        data.push_str("only\tthree\tfields\n");
        data.push_str(&line("north", "7.0", "P", "IT", "1", ""));
        data.push_str(&line("45.0", "7.0", "P", "IT", "-5", ""));
        data.push_str(&line("95.0", "7.0", "P", "IT", "1", ""));
        data.push_str(&line("45.0", "7.0", "H", "IT", "0", "12"));
        data.push_str(&line("45.0", "7.0", "P", "IT", "1000", "300"));

        let gazetteer = read_gazetteer(data.as_bytes()).unwrap();
        assert_eq!(gazetteer.stats.lines, 6);
        assert_eq!(gazetteer.stats.malformed, 4);
        assert_eq!(gazetteer.stats.other_class, 1);
        assert_eq!(gazetteer.stats.entries, 1);
        assert_eq!(gazetteer.entries[0].population, 1000);
    }

    #[test]
    fn test_dump_without_populated_places_is_unusable() {
        let mut data = String::from("only\tthree\tfields\n");
        data.push_str(&line("45.0", "7.0", "H", "IT", "0", "10"));
        let gazetteer = read_gazetteer(data.as_bytes()).unwrap();

        let err = gazetteer.ensure_usable().unwrap_err();
        assert!(matches!(err, Error::ExternalSourceUnavailable { .. }));

        let usable = read_gazetteer(line("45.0", "7.0", "P", "IT", "10", "").as_bytes()).unwrap();
        assert!(usable.ensure_usable().is_ok());
    }

    #[test]
    fn test_line_errors() {
        let short = StringRecord::from(vec!["a", "b"]);
        assert_eq!(parse_record(&short), Err(GazetteerLineError::TooFewFields(2)));
    }

    #[test]
    fn test_load_gzip_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities500.txt.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder
            .write_all(line("41.9", "12.5", "P", "IT", "2800000", "20").as_bytes())
            .unwrap();
        encoder.finish().unwrap();

        let gazetteer = load_gazetteer(&path).unwrap();
        assert_eq!(gazetteer.entries.len(), 1);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = load_gazetteer(Path::new("/nonexistent/cities500.txt")).unwrap_err();
        assert!(matches!(err, Error::ExternalSourceUnavailable { .. }));
    }
}
