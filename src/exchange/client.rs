//! Exchange RPC Client: maintains one authenticated, heartbeated, secure
//! WebSocket session to the exchange and recovers from every transport
//! failure. See SPEC_FULL.md section 4.1.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use md5::{Digest, Md5};
use rand::Rng;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ExchangeConfig;
use crate::correlator::Correlator;
use crate::error::{MonitorError, Result};
use crate::exchange::protocol::{RequestEnvelope, ResponseFrame};
use crate::exchange::tls::build_connector;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ExchangeClient {
    config: ExchangeConfig,
    ws_url: String,
}

impl ExchangeClient {
    pub fn new(config: ExchangeConfig, ws_url: String) -> Self {
        Self { config, ws_url }
    }

    /// Runs forever, reconnecting after every failure. Every decoded
    /// notification is handed to `correlator`. Never returns unless
    /// `shutdown` fires.
    pub async fn run(&self, correlator: &mut Correlator, shutdown: &tokio::sync::Notify) {
        loop {
            let session = tokio::select! {
                result = self.connect_and_run(correlator) => result,
                _ = shutdown.notified() => {
                    info!("exchange client stopping on shutdown signal");
                    return;
                }
            };

            if let Err(e) = session {
                warn!(error = %e, "exchange session ended, reconnecting after back-off");
            }
            correlator.reset();

            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = shutdown.notified() => return,
            }
        }
    }

    async fn connect_and_run(&self, correlator: &mut Correlator) -> Result<()> {
        let connector = build_connector()?;
        let mut ws = timeout(OPEN_TIMEOUT, connect(&self.ws_url, connector))
            .await
            .map_err(|_| MonitorError::internal("exchange connect timed out"))??;

        self.authenticate(&mut ws).await?;
        self.subscribe(&mut ws).await?;

        let heartbeat_interval = self.config.heartbeat_interval;
        let receive_result = tokio::select! {
            result = self.receive_loop(&mut ws, correlator) => result,
            result = heartbeat_loop(&mut ws, heartbeat_interval) => result,
        };

        let _ = timeout(CLOSE_TIMEOUT, ws.close(None)).await;
        receive_result
    }

    async fn authenticate(&self, ws: &mut WsStream) -> Result<()> {
        send(
            ws,
            "challenge",
            json!({ "username": self.config.monitor_user, "version": "1" }),
        )
        .await?;
        let response = recv_response(ws).await?;
        let challenge = response
            .challenge()
            .ok_or_else(|| MonitorError::authentication("exchange did not return a challenge"))?;

        let mut hasher = Md5::new();
        hasher.update(challenge.as_bytes());
        hasher.update(self.config.monitor_password.as_bytes());
        let token = hex::encode(hasher.finalize());

        send(
            ws,
            "login",
            json!({ "token": token, "username": self.config.monitor_user }),
        )
        .await?;
        let response = recv_response(ws).await?;
        match response.status() {
            Some(0) => Ok(()),
            _ => Err(MonitorError::authentication("exchange login rejected")),
        }
    }

    async fn subscribe(&self, ws: &mut WsStream) -> Result<()> {
        send(
            ws,
            "subscribe",
            json!({ "eventnames": ["ExtensionStatus", "ActiveCallStatus"] }),
        )
        .await?;
        let response = recv_response(ws).await?;
        if !matches!(response.status(), Some(0) | None) {
            warn!(status = ?response.status(), "exchange rejected event subscription, continuing anyway");
        }
        Ok(())
    }

    async fn receive_loop(&self, ws: &mut WsStream, correlator: &mut Correlator) -> Result<()> {
        loop {
            let Some(msg) = ws.next().await else {
                return Err(MonitorError::internal("exchange closed the connection"));
            };
            let msg = msg?;
            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => {
                    return Err(MonitorError::internal("exchange sent close frame"));
                }
                _ => continue,
            };
            debug!(frame = %truncate(&text, 200), "received exchange frame");
            match serde_json::from_str::<ResponseFrame>(&text) {
                Ok(frame) => crate::exchange::decoder::handle_frame(&frame, correlator).await,
                Err(e) => debug!(error = %e, "discarding undecodable exchange frame"),
            }
        }
    }
}

async fn heartbeat_loop(ws: &mut WsStream, interval: Duration) -> Result<()> {
    loop {
        tokio::time::sleep(interval).await;
        send(ws, "heartbeat", json!({})).await?;
    }
}

async fn connect(url: &str, connector: native_tls::TlsConnector) -> Result<WsStream> {
    let (ws, _response) = tokio_tungstenite::connect_async_tls_with_config(
        url,
        None,
        false,
        Some(Connector::NativeTls(connector)),
    )
    .await?;
    Ok(ws)
}

async fn send(ws: &mut WsStream, action: &str, fields: serde_json::Value) -> Result<()> {
    let transaction_id = transaction_id();
    let envelope = RequestEnvelope::new(action, transaction_id, fields);
    let text = serde_json::to_string(&envelope)?;
    ws.send(Message::Text(text)).await?;
    Ok(())
}

async fn recv_response(ws: &mut WsStream) -> Result<ResponseFrame> {
    let msg = timeout(RESPONSE_TIMEOUT, ws.next())
        .await
        .map_err(|_| MonitorError::internal("timed out waiting for exchange response"))?
        .ok_or_else(|| MonitorError::internal("exchange closed connection during handshake"))??;
    let text = match msg {
        Message::Text(t) => t,
        other => {
            return Err(MonitorError::internal(format!(
                "unexpected frame during handshake: {other:?}"
            )))
        }
    };
    Ok(serde_json::from_str(&text)?)
}

fn transaction_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_is_sixteen_hex_chars() {
        let id = transaction_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
