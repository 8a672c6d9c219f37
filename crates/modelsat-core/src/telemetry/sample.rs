//! Sensor sample types carried through the bus
//!
//! GPS fields and battery voltage are kept as the raw text the navigation
//! board reports, because validity is judged against its zero-string
//! sentinels rather than against parsed numbers.

use serde::{Deserialize, Serialize};

/// Sensor categories, one mailbox each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Science payload barometer pressure
    Pressure,
    /// Science payload barometric altitude
    Altitude,
    Temperature,
    /// Composite navigation record from the container board
    Navigation,
    Orientation,
    /// Free-form IoT value from the ground station
    Iot,
    /// Mechanical filter state token
    FilterState,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Pressure,
        Category::Altitude,
        Category::Temperature,
        Category::Navigation,
        Category::Orientation,
        Category::Iot,
        Category::FilterState,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Pressure => "Pressure1",
            Category::Altitude => "Altitude1",
            Category::Temperature => "Temperature",
            Category::Navigation => "RP2040_Data",
            Category::Orientation => "BNO",
            Category::Iot => "IOT_Data",
            Category::FilterState => "Mech_Filter",
        }
    }
}

/// GPS fix as reported by the navigation board
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    #[serde(rename = "Latitude")]
    pub latitude: Option<String>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<String>,
    #[serde(rename = "Altitude")]
    pub altitude: Option<String>,
}

/// Composite record from the container's navigation board
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationRecord {
    /// Container pressure (None when the field was not numeric)
    #[serde(rename = "Pressure2")]
    pub pressure: Option<f64>,
    #[serde(rename = "GPS")]
    pub gps: GpsFix,
    #[serde(rename = "Battery_Voltage")]
    pub battery_voltage: Option<String>,
    /// Container altitude derived from `pressure`
    #[serde(rename = "Altitude2")]
    pub altitude: Option<f64>,
}

/// Euler angles from the inertial unit, in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    #[serde(rename = "Roll")]
    pub roll: f64,
    #[serde(rename = "Pitch")]
    pub pitch: f64,
    #[serde(rename = "Yaw")]
    pub yaw: f64,
}

/// One reading from one producer
#[derive(Debug, Clone, PartialEq)]
pub enum SensorSample {
    Pressure(f64),
    Altitude(f64),
    Temperature(f64),
    Navigation(NavigationRecord),
    Orientation(Orientation),
    Iot(String),
    FilterState(String),
}

impl SensorSample {
    pub fn category(&self) -> Category {
        match self {
            SensorSample::Pressure(_) => Category::Pressure,
            SensorSample::Altitude(_) => Category::Altitude,
            SensorSample::Temperature(_) => Category::Temperature,
            SensorSample::Navigation(_) => Category::Navigation,
            SensorSample::Orientation(_) => Category::Orientation,
            SensorSample::Iot(_) => Category::Iot,
            SensorSample::FilterState(_) => Category::FilterState,
        }
    }
}

/// Round to two decimals, the resolution every derived value is reported at
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
