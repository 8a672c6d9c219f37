//! Telemetry pipeline: bus, alarms, phases, sequencing, and distribution

pub mod broadcast;
pub mod bus;
pub mod command;
pub mod cycle;
pub mod fault;
pub mod log;
pub mod packet;
pub mod phase;
pub mod record;
pub mod sample;
pub mod sequencer;
