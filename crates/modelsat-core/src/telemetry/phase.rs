//! Flight phase state machine
//!
//! Six phases, strictly forward. Each call to [`advance`] evaluates only the
//! transition leaving the current phase, so at most one step fires per cycle.
//!
//! | From                      | Condition                                   | To                        |
//! |---------------------------|---------------------------------------------|---------------------------|
//! | `ReadyToFlight`           | 10 < altitude < 700                         | `Ascent`                  |
//! | `Ascent`                  | descent_rate < -5 and altitude > 450        | `ModelSatelliteDescent`   |
//! | `ModelSatelliteDescent`   | altitude < 450 and altitude_difference > 25 | `Release`                 |
//! | `Release`                 | altitude < 400 and descent_rate < -3        | `SciencePayloadDescent`   |
//! | `SciencePayloadDescent`   | \|roll_delta\| < 0.2 and altitude < 20      | `Recovery`                |
//!
//! Altitude, rate, and difference are truncated toward zero before comparing;
//! a missing value compares as zero.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Mission phase, ordered by flight progress
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum FlightPhase {
    #[default]
    ReadyToFlight = 0,
    Ascent = 1,
    ModelSatelliteDescent = 2,
    Release = 3,
    SciencePayloadDescent = 4,
    Recovery = 5,
}

impl FlightPhase {
    pub const ALL: [FlightPhase; 6] = [
        FlightPhase::ReadyToFlight,
        FlightPhase::Ascent,
        FlightPhase::ModelSatelliteDescent,
        FlightPhase::Release,
        FlightPhase::SciencePayloadDescent,
        FlightPhase::Recovery,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(usize::from(ordinal)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            FlightPhase::ReadyToFlight => "READY_TO_FLIGHT",
            FlightPhase::Ascent => "ASCENT",
            FlightPhase::ModelSatelliteDescent => "MODEL_SATELLITE_DESCENT",
            FlightPhase::Release => "RELEASE",
            FlightPhase::SciencePayloadDescent => "SCIENCE_PAYLOAD_DESCENT",
            FlightPhase::Recovery => "RECOVERY",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == FlightPhase::Recovery
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// On the wire a phase is its ordinal
impl Serialize for FlightPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.ordinal())
    }
}

impl<'de> Deserialize<'de> for FlightPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ordinal = u8::deserialize(deserializer)?;
        FlightPhase::from_ordinal(ordinal)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid phase ordinal {ordinal}")))
    }
}

fn truncated(value: Option<f64>) -> i64 {
    // NaN casts to 0, which matches "missing compares as zero"
    value.map(|v| v.trunc() as i64).unwrap_or(0)
}

/// Compute the next phase from the current one and this cycle's derived values
///
/// `roll_delta` is the absolute change in roll since the previous orientation
/// sample; without it the RECOVERY transition cannot fire.
pub fn advance(
    phase: FlightPhase,
    altitude: Option<f64>,
    descent_rate: Option<f64>,
    altitude_difference: Option<f64>,
    roll_delta: Option<f64>,
) -> FlightPhase {
    let altitude = truncated(altitude);
    let rate = truncated(descent_rate);
    let difference = truncated(altitude_difference);

    match phase {
        FlightPhase::ReadyToFlight if 10 < altitude && altitude < 700 => FlightPhase::Ascent,
        FlightPhase::Ascent if rate < -5 && altitude > 450 => FlightPhase::ModelSatelliteDescent,
        FlightPhase::ModelSatelliteDescent if altitude < 450 && difference > 25 => {
            FlightPhase::Release
        }
        FlightPhase::Release if altitude < 400 && rate < -3 => FlightPhase::SciencePayloadDescent,
        FlightPhase::SciencePayloadDescent => match roll_delta {
            Some(delta) if delta.abs() < 0.2 && altitude < 20 => FlightPhase::Recovery,
            _ => phase,
        },
        _ => phase,
    }
}
