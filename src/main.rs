//! Modelsat - model satellite flight software
//!
//! Entry point for the flight computer: starts the sensor producers, the
//! command processor, the ground link server, and the telemetry cycle.

use anyhow::{Context, Result};
use modelsat::config::MissionConfig;
use modelsat::sensors::refill::{FilterRefill, IotRefill};
use modelsat::sensors::serial::SerialNavigation;
use modelsat::sensors::simulate::simulated_producers;
use modelsat::sensors::{ProducerHandle, ProducerSet};
use modelsat::telemetry::broadcast::Broadcaster;
use modelsat::telemetry::bus::SampleBus;
use modelsat::telemetry::command::{command_channel, CommandProcessor, LogIndicator};
use modelsat::telemetry::cycle::{Clock, CycleLinks, SystemClock, TelemetryCycle};
use modelsat::telemetry::log::TelemetryLog;
use modelsat::telemetry::record::RecordFile;
use modelsat::telemetry::sequencer::PacketSequencer;
use modelsat_server::{AppState, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

/// Options taken from the command line
#[derive(Debug, Default)]
struct CliOptions {
    config_path: Option<PathBuf>,
    simulate: bool,
    port: Option<u16>,
}

fn main() -> Result<()> {
    let Some(options) = parse_args()? else {
        return Ok(());
    };

    let config_path = options.config_path.clone().unwrap_or_else(default_config_path);
    let mut config = MissionConfig::load(&config_path);
    if options.simulate {
        config.simulate = true;
    }
    if let Some(port) = options.port {
        config.server.port = port;
    }
    config.validate()?;

    std::fs::create_dir_all(&config.base_dir)
        .with_context(|| format!("Failed to create {}", config.base_dir.display()))?;
    let _log_guard = init_logging(&config)?;

    println!("Modelsat v{} - flight computer", modelsat::VERSION);
    tracing::info!(
        config = %config_path.display(),
        base_dir = %config.base_dir.display(),
        simulate = config.simulate,
        port = config.server.port,
        "Starting Modelsat v{}",
        modelsat::VERSION
    );

    run(config)
}

fn parse_args() -> Result<Option<CliOptions>> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = CliOptions::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("modelsat {}", modelsat::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--simulate" | "-s" => {
                options.simulate = true;
            }
            "--config" | "-c" => {
                if i + 1 >= args.len() {
                    anyhow::bail!("--config requires a path");
                }
                options.config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--port" | "-p" => {
                if i + 1 >= args.len() {
                    anyhow::bail!("--port requires a value");
                }
                let port = args[i + 1]
                    .parse()
                    .with_context(|| format!("Invalid port: {}", args[i + 1]))?;
                options.port = Some(port);
                i += 2;
                continue;
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(None);
            }
        }
        i += 1;
    }

    Ok(Some(options))
}

fn print_help() {
    println!("Usage: modelsat [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config PATH   Mission config file (default: <data_dir>/modelsat/config.json)");
    println!("  -s, --simulate      Use simulated sensors instead of flight hardware");
    println!("  -p, --port PORT     Ground link port (default: 9003)");
    println!("  -v, --version       Show version");
    println!("  -h, --help          Show this help");
    println!();
    println!("Examples:");
    println!("  modelsat --simulate --port 9100");
    println!("  modelsat -c /etc/modelsat.json");
}

/// Config file path: `<data_dir>/modelsat/config.json`
fn default_config_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modelsat")
        .join("config.json")
}

/// Log to stdout and to the mission log file in the base directory
fn init_logging(config: &MissionConfig) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let file_appender =
        tracing_appender::rolling::never(&config.base_dir, &config.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("modelsat=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

/// Hardware-facing producers the command channel starts and stops
fn build_producers(
    config: &MissionConfig,
    bus: &Arc<SampleBus>,
    container_baseline: Option<f64>,
) -> ProducerSet {
    let mut producers = ProducerSet::new(Arc::clone(bus), config.producer_interval());

    if config.simulate {
        for producer in simulated_producers() {
            producers.add(producer);
        }
        return producers;
    }

    match &config.serial_device {
        Some(device) => match SerialNavigation::open(device, container_baseline) {
            Ok(source) => producers.add(Box::new(source)),
            Err(e) => {
                tracing::error!(device = %device.display(), error = %e, "Failed to open navigation device");
            }
        },
        None => tracing::warn!("No serial device configured, navigation record disabled"),
    }

    if producers.is_empty() {
        tracing::warn!("No sensor producers available, packets will carry absent fields");
    }
    producers
}

fn run(config: MissionConfig) -> Result<()> {
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

    // Ground-fed mailboxes stay populated whether or not sensors run
    let _refills = [
        ProducerHandle::spawn(Box::new(IotRefill), Arc::clone(&bus), config.producer_interval())?,
        ProducerHandle::spawn(Box::new(FilterRefill), Arc::clone(&bus), config.producer_interval())?,
    ];

    let (_, container_baseline) = session.baselines();
    let producers = build_producers(&config, &bus, container_baseline);
    tracing::info!(producers = ?producers.names(), "Sensor producers ready");

    let mut processor = CommandProcessor::new(producers, LogIndicator::new());
    processor.boot(session.is_resumed());
    // Detached: a producer stuck in a serial read must not hold up exit
    let _processor_thread = processor
        .spawn(command_rx)
        .context("Failed to spawn command processor thread")?;

    let cycle = TelemetryCycle::new(links.clone(), sequencer, log, &config, SystemClock);
    let state = AppState::new(
        links,
        cycle.subscribe(),
        RecordFile::new(config.record_path()),
        ServerConfig::from(config.server.clone()),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        shutdown_tx.send_replace(true);
    })
    .context("Failed to install Ctrl+C handler")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(async move {
        let server_task = tokio::spawn(async move {
            if let Err(e) = modelsat_server::start_server(state).await {
                tracing::error!(error = %e, "Ground link server error");
            }
        });

        let cycle = cycle.run(shutdown_rx).await;
        tracing::info!(packet = cycle.next_packet(), phase = %cycle.phase(), "Shutting down");

        server_task.abort();
    });

    println!("Done.");
    Ok(())
}
