//! Server-Sent Events support

use crate::stream::StreamEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{BoxStream, Stream};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;

/// Marker written after the last event
pub const DONE: &str = "[DONE]";

/// One `data:` line per event, then `data: [DONE]`
pub fn sse_stream(
    events: BoxStream<'static, StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let data = events.map(|event| Ok(event_to_axum(&event)));
    let done = futures::stream::once(async { Ok(Event::default().data(DONE)) });

    Sse::new(data.chain(done)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn event_to_axum(event: &StreamEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            tracing::error!(id = %event.id(), error = %e, "Failed to serialize stream event");
            Event::default().comment("unserializable event")
        }
    }
}
