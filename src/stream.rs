//! Stream multiplexing
//!
//! Turns a router or workflow [`SourceEvent`] stream into the client-facing
//! [`StreamEvent`] stream and hands the final transcript to a sink.

mod event;
mod multiplexer;

#[cfg(test)]
mod proptests;

pub use event::{SourceEvent, StatusKind, StreamEvent};
pub use multiplexer::{Multiplexer, Transcript};
#[cfg(test)]
pub use multiplexer::FALLBACK_TEXT;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Receives the transcript of a completed stream
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn persist(&self, transcript: Transcript);
}

/// Drive `source` through a [`Multiplexer`]
///
/// On cancellation the output ends right away: no closing events and no
/// transcript. Dropping the returned stream has the same effect.
pub fn merge(
    mut source: BoxStream<'static, SourceEvent>,
    cancel: CancellationToken,
    sink: Arc<dyn TranscriptSink>,
) -> BoxStream<'static, StreamEvent> {
    let stream = async_stream::stream! {
        let mut mux = Multiplexer::new();
        for event in mux.start() {
            yield event;
        }

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!(status_id = %mux.status_id(), "Stream cancelled");
                    return;
                }
                next = source.next() => next,
            };
            let Some(event) = next else { break };
            for out in mux.push(event) {
                yield out;
            }
        }

        let (tail, transcript) = mux.finish();
        for event in tail {
            yield event;
        }
        sink.persist(transcript).await;
    };
    stream.boxed()
}
