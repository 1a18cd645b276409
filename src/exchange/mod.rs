//! Everything that talks to the exchange: the persistent WebSocket RPC
//! client, wire protocol types, frame decoding, and the click-to-dial HTTP
//! client.

pub mod client;
pub mod decoder;
pub mod dial;
pub mod protocol;
pub mod tls;

pub use client::ExchangeClient;
pub use dial::DialClient;
