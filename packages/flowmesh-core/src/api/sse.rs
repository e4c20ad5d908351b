//! Server-sent event streams: metrics snapshots, frame inspector records,
//! and domain events.
//!
//! All three streams are stateless per connection: a reconnecting client
//! simply subscribes to the underlying broadcast channel again. A slow
//! client that lags the channel skips ahead; streams never fail the
//! pipeline.

use std::convert::Infallible;

use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::AppState;

fn json_event<T: Serialize>(value: &T) -> Option<Event> {
    match Event::default().json_data(value) {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!("[Sse] Failed to serialize event: {}", e);
            None
        }
    }
}

/// Adapts a broadcast receiver into an SSE stream, skipping over lag.
fn broadcast_events<T>(
    rx: broadcast::Receiver<T>,
    label: &'static str,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    T: Serialize + Clone + Send + 'static,
{
    BroadcastStream::new(rx).filter_map(move |result| {
        let event = match result {
            Ok(item) => json_event(&item),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                log::debug!("[Sse] {} consumer lagged by {} events", label, n);
                None
            }
        };
        futures::future::ready(event.map(Ok))
    })
}

/// `GET /metrics` — one [`MetricsSnapshot`](crate::metrics::MetricsSnapshot)
/// per event, at the sampling cadence.
pub(super) async fn metrics_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.metrics.subscribe();
    Sse::new(broadcast_events(rx, "metrics")).keep_alive(KeepAlive::default())
}

/// `GET /events` — graph/node/pipeline domain events.
pub(super) async fn events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_bridge.subscribe();
    Sse::new(broadcast_events(rx, "events")).keep_alive(KeepAlive::default())
}

/// `GET /frames` — recent pipeline messages, then the live feed.
///
/// The replay and the subscription are taken atomically, so the boundary
/// between them neither drops nor repeats a record.
pub(super) async fn frames_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (replay, mut rx) = state.inspector.subscribe_with_replay();
    let stream = stream! {
        for record in replay {
            if let Some(event) = json_event(&record) {
                yield Ok(event);
            }
        }
        loop {
            match rx.recv().await {
                Ok(record) => {
                    if let Some(event) = json_event(&record) {
                        yield Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::debug!("[Sse] frames consumer lagged by {} records", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
