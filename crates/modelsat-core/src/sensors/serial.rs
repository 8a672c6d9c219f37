//! Navigation board line source
//!
//! The container board streams one line per reading:
//!
//! ```text
//! pressure,latitude,longitude,gps_altitude,battery_voltage
//! ```
//!
//! GPS and battery fields are passed through as text. An empty pressure
//! field reads as 0; a non-numeric one leaves pressure and altitude absent
//! so the pressure alarm picks it up.

use super::altitude::AltitudeReference;
use super::producer::Producer;
use crate::telemetry::bus::SampleBus;
use crate::telemetry::sample::{round2, GpsFix, NavigationRecord};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const LINE_FIELDS: usize = 5;

fn text_field(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse one board line, deriving the container altitude
///
/// Returns None for lines with too few fields.
pub fn parse_navigation_line(
    line: &str,
    reference: &mut AltitudeReference,
) -> Option<NavigationRecord> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() < LINE_FIELDS {
        return None;
    }

    let raw_pressure = fields[0].trim();
    let pressure = if raw_pressure.is_empty() {
        Some(0.0)
    } else {
        raw_pressure.parse::<f64>().ok()
    };
    let altitude = pressure.map(|p| reference.altitude(p));

    Some(NavigationRecord {
        pressure: pressure.map(round2),
        gps: GpsFix {
            latitude: text_field(fields[1]),
            longitude: text_field(fields[2]),
            altitude: text_field(fields[3]),
        },
        battery_voltage: text_field(fields[4]),
        altitude,
    })
}

/// Producer reading navigation lines from a serial device (or any reader)
pub struct SerialNavigation<R> {
    reader: R,
    reference: AltitudeReference,
    line: String,
}

impl SerialNavigation<BufReader<File>> {
    /// Open a serial device node; line settings are configured outside the process
    pub fn open(path: &Path, baseline: Option<f64>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        tracing::info!(device = %path.display(), "Opened navigation serial device");
        Ok(Self::new(BufReader::new(file), baseline))
    }
}

impl<R: BufRead> SerialNavigation<R> {
    pub fn new(reader: R, baseline: Option<f64>) -> Self {
        Self {
            reader,
            reference: AltitudeReference::new(baseline),
            line: String::new(),
        }
    }

    /// Read the next line; None on end of input, read errors, or short lines
    pub fn next_record(&mut self) -> Option<NavigationRecord> {
        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Ok(0) => {
                tracing::debug!("No data received from navigation board");
                None
            }
            Ok(_) => {
                let record = parse_navigation_line(&self.line, &mut self.reference);
                if record.is_none() {
                    tracing::warn!(line = %self.line.trim(), "Malformed navigation line");
                }
                record
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read navigation line");
                None
            }
        }
    }
}

impl<R: BufRead + Send + 'static> Producer for SerialNavigation<R> {
    fn name(&self) -> &str {
        "navigation-serial"
    }

    fn produce(&mut self, bus: &SampleBus) {
        if let Some(record) = self.next_record() {
            bus.navigation.put(record);
        }
    }
}
