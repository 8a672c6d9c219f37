//! Modelsat Core - Telemetry cycle, fault detection, and packet sequencing
//!
//! This library provides the flight software core for a small atmospheric
//! payload. Independent sensor producers write into single-slot mailboxes,
//! and a fixed-cadence telemetry cycle fuses them into packets that are
//! persisted, sequenced across power loss, and fanned out to observers.

pub mod config;
pub mod error;
pub mod sensors;
pub mod telemetry;

pub use config::MissionConfig;
pub use error::TelemetryError;
pub use telemetry::{
    broadcast::Broadcaster, bus::SampleBus, cycle::TelemetryCycle, fault::FaultState,
    packet::TelemetryPacket, phase::FlightPhase,
};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of alarm bits carried in every packet
pub const ALARM_COUNT: usize = 5;

/// Seconds spent in RECOVERY before the automatic stop command
pub const DEFAULT_RECOVERY_WINDOW_SECS: u64 = 30;

/// Fixed mission identifier written as the last CSV column
pub const DEFAULT_MISSION_ID: u32 = 335592;
