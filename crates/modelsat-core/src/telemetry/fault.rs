//! Fault and alarm engine
//!
//! Produces a fixed 5-bit alarm vector every cycle:
//!
//! | Bit | Alarm                                                         |
//! |-----|---------------------------------------------------------------|
//! | 0   | Container landing rate outside [-14, -12]                     |
//! | 1   | Science payload landing rate outside [-8, -6]                 |
//! | 2   | Container pressure absent, non-numeric, or truncating to zero |
//! | 3   | GPS latitude/longitude/altitude absent or zero sentinel       |
//! | 4   | Altitude difference not yet confirmed after release           |
//!
//! Landing rates come from [`RateEstimator`], which remembers the previous
//! altitude and timestamp of its source. All of this memory lives in an
//! explicit [`FaultState`] owned by the telemetry cycle. It starts empty on
//! every process start; the first cycle after a restart can never raise a
//! rate alarm.
//!
//! Bit 4 fails closed: it stays set until one cycle at or after RELEASE sees
//! the two altitude sources more than 25 apart. That cycle latches the check
//! and the bit reads 0 for the rest of the mission, even if later samples
//! would fail the same test. [`FaultState::with_recheck`] turns the latch off
//! so the condition is evaluated every cycle instead.

use super::bus::CycleInputs;
use super::phase::FlightPhase;
use super::sample::GpsFix;
use crate::ALARM_COUNT;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::RangeInclusive;

/// Acceptable container landing rate (altitude units per second)
pub const CONTAINER_LANDING_RATE: RangeInclusive<f64> = -14.0..=-12.0;

/// Acceptable science payload landing rate (altitude units per second)
pub const SCIENCE_PAYLOAD_LANDING_RATE: RangeInclusive<f64> = -8.0..=-6.0;

/// Separation that confirms the payload has left the container
pub const ALTITUDE_DIFFERENCE_LIMIT: f64 = 25.0;

/// Latitude/longitude text the navigation board reports without a fix
pub const GPS_COORDINATE_SENTINEL: &str = "0.0000000";

/// GPS altitude text the navigation board reports without a fix
pub const GPS_ALTITUDE_SENTINEL: &str = "0.00";

/// Alarm bit positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    ContainerLandingRate = 0,
    SciencePayloadLandingRate = 1,
    ContainerPressure = 2,
    Gps = 3,
    AltitudeDifference = 4,
}

/// The 5-bit alarm vector, rendered as a `0`/`1` string
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmVector([bool; ALARM_COUNT]);

impl AlarmVector {
    pub fn set(&mut self, alarm: Alarm) {
        self.0[alarm as usize] = true;
    }

    pub fn is_set(&self, alarm: Alarm) -> bool {
        self.0[alarm as usize]
    }

    pub fn bit(&self, index: usize) -> u8 {
        u8::from(self.0[index])
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|&b| b)
    }
}

impl fmt::Display for AlarmVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &bit in &self.0 {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl Serialize for AlarmVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Landing rate estimator over consecutive samples of one altitude source
#[derive(Debug, Clone)]
pub struct RateEstimator {
    range: RangeInclusive<f64>,
    last_altitude: Option<f64>,
    last_time: Option<NaiveDateTime>,
    last_rate: Option<f64>,
}

impl RateEstimator {
    pub fn new(range: RangeInclusive<f64>) -> Self {
        Self {
            range,
            last_altitude: None,
            last_time: None,
            last_rate: None,
        }
    }

    /// Feed the current altitude. Returns true when the rate is out of range.
    ///
    /// With no previous sample (or no elapsed time) no rate is computed and
    /// no alarm is raised, but the sample is still remembered.
    pub fn update(&mut self, altitude: Option<f64>, now: NaiveDateTime) -> bool {
        let Some(altitude) = altitude else {
            return false;
        };

        let mut alarm = false;
        if let (Some(prev_altitude), Some(prev_time)) = (self.last_altitude, self.last_time) {
            let elapsed = (now - prev_time).num_microseconds().unwrap_or(0) as f64 / 1e6;
            if elapsed > 0.0 {
                let rate = (altitude - prev_altitude) / elapsed;
                self.last_rate = Some(rate);
                alarm = !self.range.contains(&rate);
            }
        }
        self.last_altitude = Some(altitude);
        self.last_time = Some(now);
        alarm
    }

    /// Most recently computed rate, kept across cycles without a new one
    pub fn last_rate(&self) -> Option<f64> {
        self.last_rate
    }

    pub fn reset(&mut self) {
        self.last_altitude = None;
        self.last_time = None;
        self.last_rate = None;
    }
}

/// Output of one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FaultReport {
    pub alarms: AlarmVector,
    /// Science payload landing rate, surfaced as the packet's descent rate
    pub descent_rate: Option<f64>,
}

/// Previous-sample memory for the alarm engine
#[derive(Debug, Clone)]
pub struct FaultState {
    container: RateEstimator,
    science_payload: RateEstimator,
    altitude_difference_checked: bool,
    recheck_altitude_difference: bool,
}

impl FaultState {
    pub fn new() -> Self {
        Self {
            container: RateEstimator::new(CONTAINER_LANDING_RATE),
            science_payload: RateEstimator::new(SCIENCE_PAYLOAD_LANDING_RATE),
            altitude_difference_checked: false,
            recheck_altitude_difference: false,
        }
    }

    /// Evaluate the altitude difference every cycle instead of latching it
    pub fn with_recheck(mut self, recheck: bool) -> Self {
        self.recheck_altitude_difference = recheck;
        self
    }

    pub fn altitude_difference_checked(&self) -> bool {
        self.altitude_difference_checked
    }

    pub fn container_landing_rate(&self) -> Option<f64> {
        self.container.last_rate()
    }

    pub fn science_payload_landing_rate(&self) -> Option<f64> {
        self.science_payload.last_rate()
    }

    /// Compute this cycle's alarms and update the estimator memory
    pub fn evaluate(
        &mut self,
        inputs: &CycleInputs,
        phase: FlightPhase,
        now: NaiveDateTime,
    ) -> FaultReport {
        let mut alarms = AlarmVector::default();

        if self.container.update(inputs.container_altitude(), now) {
            alarms.set(Alarm::ContainerLandingRate);
        }
        if self
            .science_payload
            .update(inputs.science_payload_altitude(), now)
        {
            alarms.set(Alarm::SciencePayloadLandingRate);
        }
        if !pressure_valid(inputs.container_pressure()) {
            alarms.set(Alarm::ContainerPressure);
        }
        if !gps_valid(inputs.gps()) {
            alarms.set(Alarm::Gps);
        }

        let difference = match (inputs.science_payload_altitude(), inputs.container_altitude()) {
            (Some(payload), Some(container)) => Some((payload - container).abs()),
            _ => None,
        };
        if self.altitude_difference_alarm(phase, difference) {
            alarms.set(Alarm::AltitudeDifference);
        }

        FaultReport {
            alarms,
            descent_rate: self.science_payload.last_rate(),
        }
    }

    fn altitude_difference_alarm(&mut self, phase: FlightPhase, difference: Option<f64>) -> bool {
        if self.altitude_difference_checked {
            return false;
        }
        let confirmed = phase >= FlightPhase::Release
            && difference.is_some_and(|d| d > ALTITUDE_DIFFERENCE_LIMIT);
        if confirmed && !self.recheck_altitude_difference {
            tracing::info!(?difference, "Altitude difference confirmed, latching check");
            self.altitude_difference_checked = true;
        }
        !confirmed
    }

    /// Forget all previous samples and the latch
    pub fn reset(&mut self) {
        self.container.reset();
        self.science_payload.reset();
        self.altitude_difference_checked = false;
    }
}

impl Default for FaultState {
    fn default() -> Self {
        Self::new()
    }
}

fn pressure_valid(pressure: Option<f64>) -> bool {
    pressure.is_some_and(|p| p.is_finite() && p.trunc() != 0.0)
}

fn gps_valid(gps: Option<&GpsFix>) -> bool {
    let Some(gps) = gps else {
        return false;
    };
    let coordinate_ok =
        |value: &Option<String>| value.as_deref().is_some_and(|v| v != GPS_COORDINATE_SENTINEL);
    coordinate_ok(&gps.latitude)
        && coordinate_ok(&gps.longitude)
        && gps
            .altitude
            .as_deref()
            .is_some_and(|v| v != GPS_ALTITUDE_SENTINEL)
}
