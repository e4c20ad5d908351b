//! Binary WebSocket for per-node video frames.
//!
//! Each message is one encoded JPEG frame from the named visual-sink node's
//! tap. The socket is read only to notice the client going away.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::sync::broadcast;

use crate::api::AppState;
use crate::error::FlowError;

/// `GET /video/ws/{node_id}` — upgrade to a binary JPEG frame stream.
pub(super) async fn video_ws(
    Path(node_id): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.runtime.has_node(&node_id) {
        return FlowError::NodeNotFound(node_id).into_response();
    }
    ws.on_upgrade(move |socket| stream_frames(socket, state, node_id))
}

async fn stream_frames(socket: WebSocket, state: AppState, node_id: String) {
    log::info!("[Video] Viewer attached to {}", node_id);
    let mut rx = state.video.subscribe(&node_id);
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(frame) => {
                    if sender.send(Message::Binary(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Viewer is behind; newest frames matter, old ones don't.
                    log::debug!("[Video] Viewer for {} lagged by {} frames", node_id, n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    log::info!("[Video] Viewer detached from {}", node_id);
}
