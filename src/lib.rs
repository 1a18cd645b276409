//! # UCM Call Monitor
//!
//! Real-time call monitoring and click-to-dial integration for a Grandstream
//! UCM-class IP exchange. The monitor keeps one authenticated WebSocket
//! session open to the exchange, correlates the raw per-channel event stream
//! into logical calls, and serves the resulting state over HTTP (including a
//! Server-Sent-Events stream) to browser clients.
//!
//! ## Architecture
//!
//! - [`exchange`]: WebSocket RPC client (auth, heartbeat, reconnect), event
//!   decoding, and the click-to-dial HTTP client.
//! - [`correlator`]: the core state machine that groups channel events into
//!   calls by correlation id.
//! - [`store`]: thread-safe snapshot of active calls and extension presence.
//! - [`fanout`]: non-blocking event broadcast to SSE subscribers.
//! - [`history`]: durable call-history log.
//! - [`directory`]: seam for the (out of scope) contact directory lookup.
//! - [`http`]: the thin axum HTTP surface.

pub mod config;
pub mod correlator;
pub mod directory;
pub mod error;
pub mod exchange;
pub mod fanout;
pub mod history;
pub mod http;
pub mod store;

pub use config::Config;
pub use error::{MonitorError, Result};
