//! Barometric altitude relative to a baseline pressure
//!
//! `altitude = 44307.7 * (1 - (p / p0) ^ 0.190284)`
//!
//! The baseline comes from the persisted record after a restart so that
//! altitudes stay continuous across power loss. Without one, the first
//! positive reading becomes the baseline.

use crate::telemetry::sample::round2;

const SCALE_M: f64 = 44307.7;
const EXPONENT: f64 = 0.190284;

/// Altitude of `pressure` above the level where `baseline` was read
pub fn barometric_altitude(pressure: f64, baseline: f64) -> f64 {
    SCALE_M * (1.0 - (pressure / baseline).powf(EXPONENT))
}

/// Pressure that reads as `altitude` above `baseline`
pub fn pressure_at(altitude: f64, baseline: f64) -> f64 {
    baseline * (1.0 - altitude / SCALE_M).powf(1.0 / EXPONENT)
}

/// Per-sensor baseline holder
#[derive(Debug, Clone, Default)]
pub struct AltitudeReference {
    baseline: Option<f64>,
}

impl AltitudeReference {
    /// Start from a restored baseline; zero or absent means none yet
    pub fn new(baseline: Option<f64>) -> Self {
        let baseline = baseline.filter(|b| b.is_finite() && *b > 0.0);
        if let Some(b) = baseline {
            tracing::info!(baseline = b, "Restored baseline pressure");
        }
        Self { baseline }
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Altitude for `pressure`, rounded to 2 decimals
    ///
    /// Returns 0 until a positive pressure has been seen.
    pub fn altitude(&mut self, pressure: f64) -> f64 {
        if self.baseline.is_none() && pressure.is_finite() && pressure > 0.0 {
            tracing::info!(baseline = pressure, "Captured baseline pressure");
            self.baseline = Some(pressure);
        }
        match self.baseline {
            Some(baseline) => round2(barometric_altitude(pressure, baseline)),
            None => 0.0,
        }
    }
}
