use crate::ingest::IngestState;

use reelsync_core::UiEvent;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

/// `GET /events`: stream UI events as JSON text frames.
pub(crate) async fn events(ws: WebSocketUpgrade, State(state): State<IngestState>) -> Response {
    let events_rx = state.ui.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events_rx, state))
}

async fn forward_events(
    mut socket: WebSocket,
    mut events_rx: broadcast::Receiver<UiEvent>,
    state: IngestState,
) {
    let mut shutdown_rx = state.shutdown_rx.clone();
    info!("UI event subscriber connected");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }

            incoming = socket.recv() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }

            event = events_rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "UI event subscriber lagging, events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = ?e, "Failed to serialize UI event");
                        continue;
                    }
                };

                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!("UI event subscriber went away");
                    break;
                }
            }
        }
    }

    info!("UI event subscriber disconnected");
}
