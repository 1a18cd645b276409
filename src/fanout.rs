//! Event Fan-out: publishes logical call/presence events to a dynamic set of
//! bounded subscriber queues backing SSE streams. A slow or stalled
//! subscriber never blocks publication for everyone else.

use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Queue depth per SSE subscriber. Deliberately small: a browser tab that
/// can't keep up should lose history, not stall the correlator.
const SUBSCRIBER_CAPACITY: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct FanoutEvent {
    pub event: &'static str,
    pub data: Value,
}

impl FanoutEvent {
    pub fn ring(data: Value) -> Self {
        Self { event: "call_ring", data }
    }
    pub fn connect(data: Value) -> Self {
        Self { event: "call_connect", data }
    }
    pub fn hangup(data: Value) -> Self {
        Self { event: "call_hangup", data }
    }
    pub fn presence(data: Value) -> Self {
        Self { event: "presence", data }
    }
}

pub type Subscriber = mpsc::Sender<FanoutEvent>;

#[derive(Default)]
pub struct Fanout {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns the receiving half for its SSE
    /// handler to stream from.
    pub fn subscribe(&self) -> mpsc::Receiver<FanoutEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.lock().expect("fanout poisoned").push(tx);
        rx
    }

    /// Publishes `event` to every live subscriber. Full or closed channels
    /// are dropped from the list without blocking.
    pub fn publish(&self, event: FanoutEvent) {
        let mut subscribers = self.subscribers.lock().expect("fanout poisoned");
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}
