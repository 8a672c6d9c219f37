//! WebSocket channels
//!
//! - `/api/v1/ws`: data channel, one JSON packet per text frame
//! - `/api/v1/command`: one command token per text frame
//! - `/api/v1/iot`: `value,trigger` frames from the IoT station
//! - `/api/v1/filter`: 4-character filter tokens

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use modelsat_core::telemetry::command::Command;

/// Data channel upgrade handler
pub async fn data_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_data(socket, state))
}

/// Forward every published packet to one observer until either side closes
async fn handle_data(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (observer, mut rx) = state.broadcaster.register();
    tracing::info!(observer, "Observer connected");

    // Spawn task to forward published packets to this client
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    // Spawn task to handle incoming messages (pings, close)
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    state.broadcaster.unregister(observer);
    tracing::info!(observer, "Observer disconnected");
}

/// Call `on_text` for every text frame until the client closes
async fn for_each_text(mut socket: WebSocket, mut on_text: impl FnMut(&str)) {
    while let Some(Ok(msg)) = socket.next().await {
        match msg {
            Message::Text(text) => on_text(text.as_str()),
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Command channel upgrade handler
pub async fn command_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        tracing::info!("Command client connected");
        for_each_text(socket, |text| {
            let command = Command::parse(text);
            tracing::info!(%command, "Command received");
            if state.commands.send(command).is_err() {
                tracing::error!("Command processor is not running");
            }
        })
        .await;
        tracing::info!("Command client disconnected");
    })
}

/// An IoT frame: the value to report and whether a manual release was asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IotFrame {
    pub value: String,
    pub release: bool,
}

/// Parse `value,trigger`; the trigger is `true` in any case to request release
pub fn parse_iot_frame(text: &str) -> Option<IotFrame> {
    let (value, trigger) = text.trim().split_once(',')?;
    Some(IotFrame {
        value: value.trim().to_string(),
        release: trigger.trim().eq_ignore_ascii_case("true"),
    })
}

/// IoT channel upgrade handler
pub async fn iot_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        for_each_text(socket, |text| match parse_iot_frame(text) {
            Some(frame) => {
                tracing::debug!(value = %frame.value, release = frame.release, "IoT frame received");
                if frame.release {
                    tracing::warn!("Manual release requested");
                }
                state.bus.iot.put(frame.value);
            }
            None => tracing::warn!(frame = %text, "Malformed IoT frame"),
        })
        .await;
    })
}

/// Filter tokens are exactly four characters, e.g. `2R1G`
pub fn parse_filter_token(text: &str) -> Option<&str> {
    let token = text.trim();
    (token.chars().count() == 4).then_some(token)
}

/// Filter channel upgrade handler
pub async fn filter_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        for_each_text(socket, |text| match parse_filter_token(text) {
            Some(token) => {
                tracing::info!(%token, "Filter token received");
                state.bus.filter_state.put(token.to_string());
            }
            None => tracing::debug!(frame = %text, "Ignoring filter frame"),
        })
        .await;
    })
}
