//! REST API endpoints for modelsat
//!
//! All endpoints are under /api/v1/ and return JSON.

use crate::AppState;
use axum::extract::State;
use axum::response::Json;
use modelsat_core::telemetry::packet::TelemetryPacket;
use modelsat_core::telemetry::record::PersistedRecord;
use modelsat_core::FlightPhase;
use serde::Serialize;

/// Flight computer status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub phase: String,
    pub phase_ordinal: u8,
    /// Number the next packet will carry
    pub next_packet: u64,
    /// Connected data channel observers
    pub observers: usize,
    pub last_packet: Option<TelemetryPacket>,
}

/// Persisted record response
#[derive(Serialize)]
pub struct RecordResponse {
    pub packet_count: u64,
    pub baseline_a: f64,
    pub baseline_b: f64,
    pub phase: String,
    pub phase_ordinal: u8,
}

impl From<PersistedRecord> for RecordResponse {
    fn from(record: PersistedRecord) -> Self {
        Self {
            packet_count: record.packet_count,
            baseline_a: record.baseline_a,
            baseline_b: record.baseline_b,
            phase: record.phase.name().to_string(),
            phase_ordinal: record.phase.ordinal(),
        }
    }
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let last_packet = state.latest_packet();
    let record = state.record.load_valid();

    let phase = last_packet
        .as_ref()
        .map(|p| p.phase)
        .or(record.map(|r| r.phase))
        .unwrap_or(FlightPhase::ReadyToFlight);
    let next_packet = last_packet
        .as_ref()
        .map(|p| p.packet + 1)
        .or(record.map(|r| r.packet_count))
        .unwrap_or(0);

    Json(StatusResponse {
        version: modelsat_core::VERSION.to_string(),
        phase: phase.name().to_string(),
        phase_ordinal: phase.ordinal(),
        next_packet,
        observers: state.broadcaster.observer_count(),
        last_packet,
    })
}

/// GET /api/v1/record
pub async fn get_record(State(state): State<AppState>) -> Json<Option<RecordResponse>> {
    Json(state.record.load_valid().map(RecordResponse::from))
}
