//! Standalone test server for E2E testing
//!
//! Starts the Axum server with simulated producers already running, a command
//! processor, and a telemetry cycle writing into a temporary mission
//! directory, so every channel can be exercised without flight hardware.

use modelsat_core::sensors::simulate::simulated_producers;
use modelsat_core::sensors::ProducerSet;
use modelsat_core::telemetry::broadcast::Broadcaster;
use modelsat_core::telemetry::bus::SampleBus;
use modelsat_core::telemetry::command::{
    command_channel, CommandProcessor, LogIndicator, ProducerControl,
};
use modelsat_core::telemetry::cycle::{Clock, CycleLinks, SystemClock, TelemetryCycle};
use modelsat_core::telemetry::log::TelemetryLog;
use modelsat_core::telemetry::record::RecordFile;
use modelsat_core::telemetry::sequencer::PacketSequencer;
use modelsat_core::MissionConfig;
use modelsat_server::{AppState, ServerConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("modelsat=debug".parse()?),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9003u16);

    let base_dir = std::env::temp_dir().join(format!("modelsat-test-{}", std::process::id()));
    let config = MissionConfig {
        base_dir,
        simulate: true,
        ..MissionConfig::default()
    };

    let (sequencer, session) = PacketSequencer::open(RecordFile::new(config.record_path()));
    let log = TelemetryLog::open(
        config.csv_path(),
        config.backup_path(),
        config.mission_id,
        &session,
        SystemClock.now(),
    );

    let bus = Arc::new(SampleBus::new());
    let (commands, command_rx) = command_channel();
    let links = CycleLinks {
        bus: Arc::clone(&bus),
        broadcaster: Arc::new(Broadcaster::default()),
        commands,
    };

    let mut producers = ProducerSet::new(Arc::clone(&bus), config.producer_interval());
    for producer in simulated_producers() {
        producers.add(producer);
    }
    producers.start_all();
    let processor = CommandProcessor::new(producers, LogIndicator::new());
    let _processor_thread = processor.spawn(command_rx)?;

    let cycle = TelemetryCycle::new(links.clone(), sequencer, log, &config, SystemClock);
    let state = AppState::new(
        links,
        cycle.subscribe(),
        RecordFile::new(config.record_path()),
        ServerConfig {
            port,
            bind_addr: "127.0.0.1".to_string(),
        },
    );

    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(cycle.run(shutdown_rx));

    tracing::info!(port, dir = %config.base_dir.display(), "Test server starting");
    modelsat_server::start_server(state).await
}
