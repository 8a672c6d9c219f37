//! Error types for the telemetry core

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting or distributing telemetry
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record: expected 4 fields, found {0}")]
    MalformedRecord(usize),

    #[error("Malformed record field {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TelemetryError {
    /// Attach a path to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
