//! Error types shared by the library.

use thiserror::Error as ThisError;

use crate::pipeline::Stage;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("place store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("gazetteer read error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// An external data source (elevation tiles, gazetteer dump) could not be used.
    #[error("{source_name} unavailable: {reason}")]
    ExternalSourceUnavailable { source_name: String, reason: String },

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("pipeline stage out of order: expected {expected:?}, found {actual:?}")]
    StageOutOfOrder { expected: Stage, actual: Stage },

    #[error("{label}: batch {batch} failed after {attempts} attempts: {reason}")]
    BatchFailed {
        label: String,
        batch: usize,
        attempts: u32,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExternalSourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}
