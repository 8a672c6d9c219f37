//! Modelsat Web Server - Axum WebSocket and JSON surface
//!
//! Ground stations connect here to receive packets on the data channel and
//! to send commands, IoT values, and filter tokens back to the flight
//! computer. Status endpoints expose the latest packet and persisted record.

pub mod api;
pub mod ws;

use axum::http::{header, HeaderValue};
use axum::Router;
use modelsat_core::config::ServerSettings;
use modelsat_core::telemetry::broadcast::Broadcaster;
use modelsat_core::telemetry::bus::SampleBus;
use modelsat_core::telemetry::command::CommandSender;
use modelsat_core::telemetry::cycle::CycleLinks;
use modelsat_core::telemetry::packet::TelemetryPacket;
use modelsat_core::telemetry::record::RecordFile;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerSettings::default().into()
    }
}

impl From<ServerSettings> for ServerConfig {
    fn from(settings: ServerSettings) -> Self {
        Self {
            port: settings.port,
            bind_addr: settings.bind_addr,
        }
    }
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    /// Mailboxes fed by the IoT and filter channels
    pub bus: Arc<SampleBus>,
    /// Observer registry for the data channel
    pub broadcaster: Arc<Broadcaster>,
    /// Command channel into the command processor
    pub commands: CommandSender,
    /// Most recently assembled packet
    pub latest: watch::Receiver<Option<TelemetryPacket>>,
    /// Persisted packet record
    pub record: RecordFile,
    /// Server configuration
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        links: CycleLinks,
        latest: watch::Receiver<Option<TelemetryPacket>>,
        record: RecordFile,
        config: ServerConfig,
    ) -> Self {
        Self {
            bus: links.bus,
            broadcaster: links.broadcaster,
            commands: links.commands,
            latest,
            record,
            config,
        }
    }

    /// Snapshot of the latest packet (the watch lock is released on return)
    pub fn latest_packet(&self) -> Option<TelemetryPacket> {
        self.latest.borrow().clone()
    }
}

/// Build the Axum router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // REST API
        .route("/api/v1/status", axum::routing::get(api::get_status))
        .route("/api/v1/record", axum::routing::get(api::get_record))
        // WebSocket channels
        .route("/api/v1/ws", axum::routing::get(ws::data_handler))
        .route("/api/v1/command", axum::routing::get(ws::command_handler))
        .route("/api/v1/iot", axum::routing::get(ws::iot_handler))
        .route("/api/v1/filter", axum::routing::get(ws::filter_handler))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the web server
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind_addr, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Modelsat ground link listening");
    serve(listener, state).await
}
