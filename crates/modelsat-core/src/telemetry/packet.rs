//! Outbound telemetry packet
//!
//! One packet is assembled per cycle. It serializes to the JSON object sent
//! on the data channel and flattens to the 21-column CSV row.

use super::fault::AlarmVector;
use super::phase::FlightPhase;
use super::sample::{NavigationRecord, Orientation};
use chrono::NaiveDateTime;
use serde::Serialize;

/// CSV header, in column order
pub const CSV_HEADER: [&str; 21] = [
    "Packet_Count",
    "Satellite_Status",
    "Error_Code",
    "Mission_Time",
    "Pressure1",
    "Pressure2",
    "Altitude1",
    "Altitude2",
    "Altitude_Difference",
    "Descent_Rate",
    "Temperature",
    "Battery_Voltage",
    "Gps_Latitude",
    "Gps_Longitude",
    "Gps_Altitude",
    "Pitch",
    "Roll",
    "Yaw",
    "Filter_State",
    "IOT_Data",
    "Mission_Id",
];

/// Format a mission timestamp as `D/M/Y; H:M:S` without zero padding
pub fn format_mission_time(time: NaiveDateTime) -> String {
    time.format("%-d/%-m/%Y; %-H:%-M:%-S").to_string()
}

/// Everything known about one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPacket {
    #[serde(rename = "Packet")]
    pub packet: u64,
    #[serde(rename = "Pressure1")]
    pub pressure: Option<f64>,
    #[serde(rename = "Altitude1")]
    pub altitude: Option<f64>,
    #[serde(rename = "Temperature")]
    pub temperature: Option<f64>,
    #[serde(rename = "RP2040_Data")]
    pub navigation: Option<NavigationRecord>,
    #[serde(rename = "BNO")]
    pub orientation: Option<Orientation>,
    #[serde(rename = "IOT_Data")]
    pub iot: Option<String>,
    #[serde(rename = "Mech_Filter")]
    pub filter_state: Option<String>,
    #[serde(rename = "Descent_Rate")]
    pub descent_rate: Option<f64>,
    #[serde(rename = "Mission_Time")]
    pub mission_time: String,
    #[serde(rename = "Altitude_Difference")]
    pub altitude_difference: f64,
    #[serde(rename = "Error_Codes")]
    pub error_codes: AlarmVector,
    #[serde(rename = "Satellite_Status")]
    pub phase: FlightPhase,
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl TelemetryPacket {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Flatten to CSV columns in [`CSV_HEADER`] order; absent values are empty
    pub fn csv_row(&self, mission_id: u32) -> Vec<String> {
        let nav = self.navigation.as_ref();
        let gps = nav.map(|n| &n.gps);
        vec![
            self.packet.to_string(),
            self.phase.ordinal().to_string(),
            self.error_codes.to_string(),
            self.mission_time.clone(),
            cell(self.pressure),
            cell(nav.and_then(|n| n.pressure)),
            cell(self.altitude),
            cell(nav.and_then(|n| n.altitude)),
            self.altitude_difference.to_string(),
            cell(self.descent_rate),
            cell(self.temperature),
            cell(nav.and_then(|n| n.battery_voltage.as_deref())),
            cell(gps.and_then(|g| g.latitude.as_deref())),
            cell(gps.and_then(|g| g.longitude.as_deref())),
            cell(gps.and_then(|g| g.altitude.as_deref())),
            cell(self.orientation.map(|o| o.pitch)),
            cell(self.orientation.map(|o| o.roll)),
            cell(self.orientation.map(|o| o.yaw)),
            cell(self.filter_state.as_deref()),
            cell(self.iot.as_deref()),
            mission_id.to_string(),
        ]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::telemetry::fault::Alarm;
    use crate::telemetry::sample::GpsFix;
    use chrono::NaiveDate;

    pub(crate) fn sample_packet() -> TelemetryPacket {
        let mut error_codes = AlarmVector::default();
        error_codes.set(Alarm::Gps);
        TelemetryPacket {
            packet: 7,
            pressure: Some(1001.25),
            altitude: Some(120.5),
            temperature: Some(21.3),
            navigation: Some(NavigationRecord {
                pressure: Some(1000.5),
                gps: GpsFix {
                    latitude: Some("0.0000000".into()),
                    longitude: Some("32.8541000".into()),
                    altitude: Some("950.00".into()),
                },
                battery_voltage: Some("3.87".into()),
                altitude: Some(118.0),
            }),
            orientation: Some(Orientation {
                roll: 10.5,
                pitch: -2.0,
                yaw: 180.0,
            }),
            iot: Some("23".into()),
            filter_state: Some("0N0N".into()),
            descent_rate: None,
            mission_time: "30/8/2024; 9:5:7".into(),
            altitude_difference: 2.5,
            error_codes,
            phase: FlightPhase::Ascent,
        }
    }

    #[test]
    fn test_mission_time_format() {
        let time = NaiveDate::from_ymd_opt(2024, 8, 30)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap();
        assert_eq!(format_mission_time(time), "30/8/2024; 9:5:7");
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&sample_packet().to_json().unwrap()).unwrap();
        assert_eq!(json["Packet"], 7);
        assert_eq!(json["Error_Codes"], "00010");
        assert_eq!(json["Satellite_Status"], 1);
        assert_eq!(json["Mission_Time"], "30/8/2024; 9:5:7");
        assert!(json["Descent_Rate"].is_null());
        assert_eq!(json["Altitude_Difference"], 2.5);
        assert_eq!(json["RP2040_Data"]["Altitude2"], 118.0);
        assert_eq!(json["BNO"]["Roll"], 10.5);
        assert_eq!(json["RP2040_Data"]["GPS"]["Latitude"], "0.0000000");
        assert_eq!(json["Mech_Filter"], "0N0N");
    }

    #[test]
    fn test_absent_categories_are_null() {
        let mut packet = sample_packet();
        packet.navigation = None;
        packet.iot = None;
        let json = serde_json::to_value(&packet).unwrap();
        assert!(json["RP2040_Data"].is_null());
        assert!(json["IOT_Data"].is_null());
    }

    #[test]
    fn test_csv_row_matches_header() {
        let row = sample_packet().csv_row(335592);
        assert_eq!(row.len(), CSV_HEADER.len());
        assert_eq!(row[0], "7");
        assert_eq!(row[1], "1");
        assert_eq!(row[2], "00010");
        assert_eq!(row[5], "1000.5");
        assert_eq!(row[9], "", "absent descent rate is an empty cell");
        assert_eq!(row[12], "0.0000000");
        assert_eq!(row[16], "10.5");
        assert_eq!(row[18], "0N0N");
        assert_eq!(row[20], "335592");
    }
}
