//! GeoNames gazetteer: dump parsing and download.

mod download;
mod parser;

pub use download::{ensure_gazetteer, extract_dump, GEONAMES_URL};
pub use parser::{
    load_gazetteer, parse_record, read_gazetteer, Gazetteer, GazetteerLineError, GazetteerStats,
};
