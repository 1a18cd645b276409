use thiserror::Error;

/// Errors surfaced across module boundaries in the monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// WebSocket/TCP/TLS transport failure talking to the exchange.
    #[error("exchange transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// Challenge/login sequence failed or was rejected.
    #[error("exchange authentication failed: {0}")]
    Authentication(String),

    /// A frame could not be decoded into the expected shape.
    #[error("failed to decode exchange frame: {0}")]
    Decode(#[from] serde_json::Error),

    /// The click-to-dial HTTP client could not reach or was rejected by the exchange.
    #[error("click-to-dial request failed: {0}")]
    Dial(String),

    #[error("click-to-dial transport error: {0}")]
    DialTransport(#[from] reqwest::Error),

    /// Call-history persistence failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request validation failure, mapped to HTTP 400.
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// Configuration missing or malformed at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for conditions that should never happen in practice.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn dial<S: Into<String>>(msg: S) -> Self {
        Self::Dial(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
