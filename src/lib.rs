//! Modelsat - model satellite flight software
//!
//! This library re-exports the telemetry core from `modelsat-core`.
//! The ground link lives in `modelsat-server`; the `modelsat` binary wires
//! producers, the telemetry cycle, the command processor, and the server.

pub use modelsat_core::config;
pub use modelsat_core::sensors;
pub use modelsat_core::telemetry;

pub use modelsat_core::{
    Broadcaster, FaultState, FlightPhase, MissionConfig, SampleBus, TelemetryCycle,
    TelemetryError, TelemetryPacket,
};
pub use modelsat_core::{ALARM_COUNT, DEFAULT_MISSION_ID, DEFAULT_RECOVERY_WINDOW_SECS, VERSION};
