//! Server-Sent Events for statistics progress and streamed query generation.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::StreamExt;

use crate::auth::AdminContext;
use crate::state::SharedState;

fn tagged<T: Serialize>(kind: &str, payload: &T) -> Value {
    let mut data = serde_json::to_value(payload).unwrap_or(Value::Null);
    match &mut data {
        Value::Object(map) => {
            map.insert("type".into(), json!(kind));
        }
        other => *other = json!({ "type": kind, "data": other.take() }),
    }
    data
}

/// A named event whose JSON payload also carries the name under `type`.
pub fn typed_event<T: Serialize>(kind: &str, payload: &T) -> Event {
    Event::default().event(kind).data(tagged(kind, payload).to_string())
}

pub fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(Duration::from_secs(15)).text("ping")
}

/// Turn a channel of events into an SSE response that ends when every sender is dropped.
pub fn channel_response(rx: mpsc::UnboundedReceiver<Event>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(UnboundedReceiverStream::new(rx).map(Ok::<Event, Infallible>)).keep_alive(keep_alive())
}

/// Progress of every statistics update, starting with the next change.
pub async fn statistics_events(
    _admin: AdminContext,
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.statistics.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok().map(|progress| Ok(typed_event("progress", &progress))));

    Sse::new(stream).keep_alive(keep_alive())
}
