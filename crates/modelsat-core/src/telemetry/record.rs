//! Persisted packet record
//!
//! A single comma-separated line that survives power loss:
//!
//! ```text
//! packet_count,baseline_ref_A,baseline_ref_B,phase_ordinal
//! ```
//!
//! The three baseline fields are written once, on the first packet of a
//! session. After that only the count field is rewritten, and the baseline
//! text is carried over byte-for-byte.
//!
//! A record is well-formed when it has exactly four fields, the count is an
//! unsigned integer and the phase is a known ordinal. A baseline field that
//! is not a number (`None`, empty) is "no baseline" and reads as 0. Session
//! detection and count updates both go through [`PersistedRecord::parse`],
//! so a record that resumes a session is also one whose count gets updated.

use super::phase::FlightPhase;
use crate::error::{Result, TelemetryError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Number of fields in a well-formed record
pub const RECORD_FIELDS: usize = 4;

/// Parsed record contents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistedRecord {
    /// Number of the next packet to send
    pub packet_count: u64,
    /// Science payload barometer pressure at the first packet
    pub baseline_a: f64,
    /// Container pressure at the first packet
    pub baseline_b: f64,
    /// Phase at the time the baseline was captured, or the last loaded one
    pub phase: FlightPhase,
}

impl PersistedRecord {
    pub fn parse(text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.trim().split(',').collect();
        if fields.len() != RECORD_FIELDS {
            return Err(TelemetryError::MalformedRecord(fields.len()));
        }

        let malformed = |field: &'static str, value: &str| TelemetryError::MalformedField {
            field,
            value: value.to_string(),
        };

        let packet_count = fields[0]
            .trim()
            .parse::<u64>()
            .map_err(|_| malformed("packet_count", fields[0]))?;
        let baseline_a = parse_baseline(fields[1]);
        let baseline_b = parse_baseline(fields[2]);
        let phase = fields[3]
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(FlightPhase::from_ordinal)
            .ok_or_else(|| malformed("phase_ordinal", fields[3]))?;

        Ok(Self {
            packet_count,
            baseline_a,
            baseline_b,
            phase,
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.packet_count,
            self.baseline_a,
            self.baseline_b,
            self.phase.ordinal()
        )
    }

    /// Baseline A, or None when it was captured without a reading
    pub fn baseline_a(&self) -> Option<f64> {
        non_zero(self.baseline_a)
    }

    /// Baseline B, or None when it was captured without a reading
    pub fn baseline_b(&self) -> Option<f64> {
        non_zero(self.baseline_b)
    }
}

fn parse_baseline(field: &str) -> f64 {
    field.trim().parse::<f64>().unwrap_or(0.0)
}

fn non_zero(value: f64) -> Option<f64> {
    (value.is_finite() && value != 0.0).then_some(value)
}

/// The record file on disk
#[derive(Debug, Clone)]
pub struct RecordFile {
    path: PathBuf,
}

impl RecordFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read_raw(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TelemetryError::io(&self.path, e)),
        }
    }

    // Write-then-rename so a power cut never leaves a half-written record
    fn write_raw(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| TelemetryError::io(parent, e))?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, line).map_err(|e| TelemetryError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| TelemetryError::io(&self.path, e))
    }

    /// Read and parse the record. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<PersistedRecord>> {
        match self.read_raw()? {
            Some(text) => PersistedRecord::parse(&text).map(Some),
            None => Ok(None),
        }
    }

    /// Read the record, treating any problem as "no record"
    pub fn load_valid(&self) -> Option<PersistedRecord> {
        match self.load() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unusable packet record");
                None
            }
        }
    }

    /// Write the full 4-field record
    pub fn write(&self, record: &PersistedRecord) -> Result<()> {
        self.write_raw(&record.to_line())
    }

    /// Rewrite only the count field, preserving the baseline text
    ///
    /// Returns false (and writes nothing) when the file is missing or not a
    /// well-formed record.
    pub fn update_count(&self, packet_count: u64) -> Result<bool> {
        let Some(text) = self.read_raw()? else {
            return Ok(false);
        };
        if PersistedRecord::parse(&text).is_err() {
            return Ok(false);
        }
        let mut fields: Vec<&str> = text.trim().split(',').collect();
        let count = packet_count.to_string();
        fields[0] = &count;
        self.write_raw(&fields.join(","))?;
        Ok(true)
    }
}
