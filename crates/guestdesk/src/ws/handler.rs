//! WebSocket handlers for viewer event streams.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::api::AppState;

use super::hub::EventHub;

/// Ping interval for keepalive.
const PING_INTERVAL_SECS: u64 = 30;

/// Upgrade handler for the conversation change stream.
///
/// GET /api/events
pub async fn change_events_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.change_hub.clone();
    ws.on_upgrade(move |socket| serve_stream(socket, hub, "change"))
}

/// Upgrade handler for the read-state change stream.
///
/// GET /api/read-state-events
pub async fn read_state_events_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.read_state_hub.clone();
    ws.on_upgrade(move |socket| serve_stream(socket, hub, "read-state"))
}

/// Serve one viewer connection: forward hub frames and keepalive pings until
/// the viewer disconnects. The socket carries no backlog; a reconnecting
/// viewer re-fetches instead.
async fn serve_stream<E>(socket: WebSocket, hub: Arc<EventHub<E>>, stream_name: &'static str)
where
    E: Serialize + Send + Sync + 'static,
{
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut frames) = hub.register();
    info!("Viewer connected to {} stream ({})", stream_name, conn_id);

    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        // The first tick fires immediately; skip it so pings are spaced out.
        ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = frames.recv() => {
                    match frame {
                        Some(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The streams are server-to-viewer only; inbound traffic is drained to
    // detect disconnects and answer protocol pings.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => {
                info!("Viewer closed {} stream ({})", stream_name, conn_id);
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!("Keepalive on {} stream ({})", stream_name, conn_id);
            }
            Ok(_) => {
                debug!("Ignoring inbound frame on {} stream ({})", stream_name, conn_id);
            }
            Err(e) => {
                warn!("WebSocket error on {} stream ({}): {}", stream_name, conn_id, e);
                break;
            }
        }
    }

    send_task.abort();
    hub.unregister(conn_id);
    info!("Viewer disconnected from {} stream ({})", stream_name, conn_id);
}
