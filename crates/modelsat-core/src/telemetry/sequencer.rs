//! Packet sequencing across restarts
//!
//! Every cycle the sequencer hands out a packet number and keeps the
//! persisted record in step with it:
//!
//! 1. On packet 0 of a session it captures the baseline pressures and the
//!    starting phase and writes the full record.
//! 2. After each packet it rewrites only the count field.
//!
//! At startup it also decides whether this is a fresh session or a resumed
//! one, which in turn decides whether the CSV log is rotated.

use super::phase::FlightPhase;
use super::record::{PersistedRecord, RecordFile};

/// How this process run relates to the data already on disk
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionKind {
    /// No well-formed record: archive old data and start over
    Fresh,
    /// A well-formed record exists: continue numbering and appending
    Resumed(PersistedRecord),
}

impl SessionKind {
    /// Decide from the record file alone
    pub fn detect(record: &RecordFile) -> Self {
        match record.load_valid() {
            Some(persisted) => SessionKind::Resumed(persisted),
            None => SessionKind::Fresh,
        }
    }

    pub fn is_resumed(&self) -> bool {
        matches!(self, SessionKind::Resumed(_))
    }

    /// Baselines to restore before any altitude is derived
    pub fn baselines(&self) -> (Option<f64>, Option<f64>) {
        match self {
            SessionKind::Resumed(record) => (record.baseline_a(), record.baseline_b()),
            SessionKind::Fresh => (None, None),
        }
    }
}

/// Hands out packet numbers and keeps the record file current
#[derive(Debug)]
pub struct PacketSequencer {
    record: RecordFile,
    next_packet: u64,
    initial_phase: FlightPhase,
}

impl PacketSequencer {
    /// Open the record and continue from it when it is valid
    pub fn open(record: RecordFile) -> (Self, SessionKind) {
        let session = SessionKind::detect(&record);
        let (next_packet, initial_phase) = match session {
            SessionKind::Resumed(persisted) => {
                tracing::info!(
                    packet = persisted.packet_count,
                    phase = %persisted.phase,
                    "Resuming from packet record"
                );
                (persisted.packet_count, persisted.phase)
            }
            SessionKind::Fresh => {
                tracing::info!(path = %record.path().display(), "No packet record, starting fresh session");
                (0, FlightPhase::ReadyToFlight)
            }
        };
        (
            Self {
                record,
                next_packet,
                initial_phase,
            },
            session,
        )
    }

    /// Number the next packet will carry
    pub fn next_packet(&self) -> u64 {
        self.next_packet
    }

    /// Phase restored from the record (READY_TO_FLIGHT on a fresh session)
    pub fn initial_phase(&self) -> FlightPhase {
        self.initial_phase
    }

    pub fn record(&self) -> &RecordFile {
        &self.record
    }

    /// Capture the baseline on the first packet of a session
    ///
    /// Absent readings are stored as 0, which reads back as "no baseline".
    /// Returns true if the full record was written.
    pub fn capture_baseline(
        &mut self,
        baseline_a: Option<f64>,
        baseline_b: Option<f64>,
        phase: FlightPhase,
    ) -> bool {
        if self.next_packet != 0 {
            return false;
        }
        let persisted = PersistedRecord {
            packet_count: 0,
            baseline_a: baseline_a.unwrap_or(0.0),
            baseline_b: baseline_b.unwrap_or(0.0),
            phase,
        };
        match self.record.write(&persisted) {
            Ok(()) => {
                tracing::info!(
                    baseline_a = persisted.baseline_a,
                    baseline_b = persisted.baseline_b,
                    "Captured baseline"
                );
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to write packet record");
                false
            }
        }
    }

    /// Move to the next packet number and persist it
    pub fn advance(&mut self) -> u64 {
        self.next_packet += 1;
        match self.record.update_count(self.next_packet) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    packet = self.next_packet,
                    "Packet record missing or malformed, count not persisted"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to update packet record");
            }
        }
        self.next_packet
    }
}
