//! Server-Sent Events framing (§6): named `event: ...` / `data: ...` frames with a
//! 15-second `ping` heartbeat, grounded on the unbounded-channel-to-stream pattern used
//! for streaming search summaries, generalized from a single unnamed `data:` stream to
//! multiple named event kinds merged with a ticker.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::{IntervalStream, UnboundedReceiverStream};
use tokio_stream::StreamExt;

const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Build a named SSE event (`event: <name>`) carrying a JSON-encoded payload.
pub fn named_event<T: Serialize>(name: &str, payload: &T) -> Event {
    Event::default()
        .event(name)
        .data(serde_json::to_string(payload).unwrap_or_else(|_| "null".to_string()))
}

/// Spawn `producer` onto its own task, feeding named events into the returned SSE
/// stream, merged with a `ping` event emitted every 15 seconds so idle connections
/// stay open through intermediate proxies.
pub fn stream_from<F, Fut>(producer: F) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    F: FnOnce(UnboundedSender<Event>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(producer(tx));

    let events = UnboundedReceiverStream::new(rx);
    let pings = IntervalStream::new(tokio::time::interval(PING_INTERVAL))
        .map(|_| Event::default().event("ping").data("{}"));

    Sse::new(events.merge(pings).map(Ok))
}
