use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Full process configuration, assembled once from the environment at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub dial: DialConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    /// Whether this process should run the background monitor task.
    /// Disabled on non-leader workers when a supervisor forks several.
    pub monitor_leader: bool,
}

/// Exchange WebSocket connection + monitor credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub host: String,
    pub ws_port: u16,
    pub monitor_user: String,
    pub monitor_password: String,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
}

/// Click-to-dial HTTP credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialConfig {
    pub host: String,
    pub http_port: u16,
    pub dial_user: String,
    pub dial_password: String,
    pub session_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: SocketAddr,
}

impl Config {
    /// Load configuration from environment variables, applying defaults
    /// documented in SPEC_FULL.md section 6.
    pub fn from_env() -> Result<Self> {
        let host = required_env("UCM_HOST")?;
        let monitor_user = required_env("UCM_MONITOR_USER")?;
        let monitor_password = required_env("UCM_MONITOR_PASSWORD")?;
        let dial_user = required_env("UCM_DIAL_USER")?;
        let dial_password = required_env("UCM_DIAL_PASSWORD")?;

        let ws_port = optional_env("UCM_WS_PORT", 8089u16)?;
        let http_port = optional_env("UCM_HTTP_PORT", 8089u16)?;
        let database_path = std::env::var("UCM_DATABASE_PATH")
            .unwrap_or_else(|_| "call_history.db".to_string());
        let http_bind: SocketAddr = std::env::var("UCM_HTTP_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| MonitorError::config(format!("invalid UCM_HTTP_BIND: {e}")))?;
        let monitor_leader = std::env::var("UCM_MONITOR_LEADER")
            .map(|v| v != "0")
            .unwrap_or(true);

        let config = Self {
            exchange: ExchangeConfig {
                host: host.clone(),
                ws_port,
                monitor_user,
                monitor_password,
                heartbeat_interval: Duration::from_secs(30),
                reconnect_delay: Duration::from_secs(10),
            },
            dial: DialConfig {
                host,
                http_port,
                dial_user,
                dial_password,
                session_timeout: Duration::from_secs(270),
            },
            database: DatabaseConfig { path: database_path },
            http: HttpConfig { bind: http_bind },
            monitor_leader,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange.host.is_empty() {
            return Err(MonitorError::config("UCM_HOST cannot be empty"));
        }
        if self.exchange.monitor_user.is_empty() || self.exchange.monitor_password.is_empty() {
            return Err(MonitorError::config(
                "UCM_MONITOR_USER and UCM_MONITOR_PASSWORD are required",
            ));
        }
        if self.dial.dial_user.is_empty() || self.dial.dial_password.is_empty() {
            return Err(MonitorError::config(
                "UCM_DIAL_USER and UCM_DIAL_PASSWORD are required",
            ));
        }
        Ok(())
    }

    pub fn ws_url(&self) -> String {
        format!("wss://{}:{}/websockify", self.exchange.host, self.exchange.ws_port)
    }

    pub fn dial_url(&self) -> String {
        format!("https://{}:{}/api", self.dial.host, self.dial.http_port)
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| MonitorError::config(format!("{name} is required")))
}

fn optional_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|e| MonitorError::config(format!("invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_host() {
        let mut cfg = sample_config();
        cfg.exchange.host = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(sample_config().validate().is_ok());
    }

    fn sample_config() -> Config {
        Config {
            exchange: ExchangeConfig {
                host: "10.0.0.5".into(),
                ws_port: 8089,
                monitor_user: "monitor".into(),
                monitor_password: "secret".into(),
                heartbeat_interval: Duration::from_secs(30),
                reconnect_delay: Duration::from_secs(10),
            },
            dial: DialConfig {
                host: "10.0.0.5".into(),
                http_port: 8089,
                dial_user: "cdrapi".into(),
                dial_password: "secret".into(),
                session_timeout: Duration::from_secs(270),
            },
            database: DatabaseConfig { path: "call_history.db".into() },
            http: HttpConfig { bind: "0.0.0.0:8080".parse().unwrap() },
            monitor_leader: true,
        }
    }
}
