//! Server-Sent-Events handler backing `GET /api/events`. Streams fan-out
//! events to one browser tab, emitting a keepalive comment every 30 seconds
//! of idle so dead connections are noticed.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::fanout::FanoutEvent;
use crate::http::AppState;

pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.fanout.subscribe();
    let stream = ReceiverStream::new(rx).map(|event: FanoutEvent| {
        let data = serde_json::to_string(&event.data).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event.event).data(data))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keepalive"),
    )
}
