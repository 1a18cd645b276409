//! Click-to-Dial Client: short-lived HTTP/JSON requests that originate
//! outbound calls on behalf of a desk extension. See SPEC_FULL.md section 4.7.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use serde_json::{json, Value};
use tracing::warn;

use crate::config::DialConfig;
use crate::error::{MonitorError, Result};

struct Session {
    cookie: String,
    issued_at: Instant,
}

pub struct DialClient {
    config: DialConfig,
    url: String,
    http: reqwest::Client,
    session: Mutex<Option<Session>>,
}

impl DialClient {
    pub fn new(config: DialConfig, url: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(MonitorError::DialTransport)?;
        Ok(Self {
            config,
            url,
            http,
            session: Mutex::new(None),
        })
    }

    /// Originates a call: rings `extension`, then dials `number` when answered.
    /// A stale cookie is retried exactly once with a fresh login.
    pub async fn dial(&self, extension: &str, number: &str) -> Result<()> {
        let cookie = self.cookie().await?;
        match self.dial_outbound(&cookie, extension, number).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!("click-to-dial request failed with cached cookie, retrying with a fresh login");
                self.invalidate_cookie();
                let cookie = self.cookie().await?;
                self.dial_outbound(&cookie, extension, number).await
            }
        }
    }

    async fn cookie(&self) -> Result<String> {
        {
            let guard = self.session.lock().expect("dial client poisoned");
            if let Some(session) = guard.as_ref() {
                if session.issued_at.elapsed() < self.config.session_timeout {
                    return Ok(session.cookie.clone());
                }
            }
        }
        self.authenticate().await
    }

    fn invalidate_cookie(&self) {
        *self.session.lock().expect("dial client poisoned") = None;
    }

    async fn authenticate(&self) -> Result<String> {
        let challenge_resp = self
            .request(json!({
                "action": "challenge",
                "user": self.config.dial_user,
                "version": "1.0",
            }))
            .await?;
        let challenge = challenge_resp
            .get("response")
            .and_then(|r| r.get("challenge"))
            .and_then(Value::as_str)
            .ok_or_else(|| MonitorError::authentication("exchange did not return a dial challenge"))?;

        let mut hasher = Md5::new();
        hasher.update(challenge.as_bytes());
        hasher.update(self.config.dial_password.as_bytes());
        let token = hex::encode(hasher.finalize());

        let login_resp = self
            .request(json!({
                "action": "login",
                "user": self.config.dial_user,
                "token": token,
            }))
            .await?;
        let cookie = login_resp
            .get("response")
            .and_then(|r| r.get("cookie"))
            .and_then(Value::as_str)
            .ok_or_else(|| MonitorError::authentication("exchange did not return a dial session cookie"))?
            .to_string();

        *self.session.lock().expect("dial client poisoned") = Some(Session {
            cookie: cookie.clone(),
            issued_at: Instant::now(),
        });
        Ok(cookie)
    }

    async fn dial_outbound(&self, cookie: &str, extension: &str, number: &str) -> Result<()> {
        self.request(json!({
            "action": "dialOutbound",
            "cookie": cookie,
            "caller": extension,
            "outbound": number,
        }))
        .await?;
        Ok(())
    }

    async fn request(&self, action: Value) -> Result<Value> {
        let body = json!({ "request": action });
        let resp = self.http.post(&self.url).json(&body).send().await?;
        let data: Value = resp.json().await?;

        let status = data
            .get("status")
            .and_then(Value::as_i64)
            .or_else(|| data.get("response").and_then(|r| r.get("status")).and_then(Value::as_i64));
        if let Some(status) = status {
            if status != 0 {
                let message = data
                    .get("response")
                    .and_then(|r| r.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("exchange rejected the request")
                    .to_string();
                return Err(MonitorError::dial(message));
            }
        }
        Ok(data)
    }
}
