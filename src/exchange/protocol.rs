//! Wire types for the exchange's WebSocket RPC protocol.
//!
//! The exchange wraps every outbound request in a `{"type": "request",
//! "message": {...}}` envelope and delivers notifications as `{"message":
//! <object-or-array>}`. This module models both shapes and the event bodies
//! the correlator cares about.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct RequestEnvelope<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: RequestMessage<'a>,
}

#[derive(Debug, Serialize)]
pub struct RequestMessage<'a> {
    pub action: &'a str,
    pub transactionid: String,
    #[serde(flatten)]
    pub fields: Value,
}

impl<'a> RequestEnvelope<'a> {
    pub fn new(action: &'a str, transaction_id: String, fields: Value) -> Self {
        Self {
            kind: "request",
            message: RequestMessage {
                action,
                transactionid: transaction_id,
                fields,
            },
        }
    }
}

/// A decoded notification/response frame. `message` may be a single object
/// or an array of objects on the wire; both are normalized into `items`.
#[derive(Debug, Deserialize)]
pub struct ResponseFrame {
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
}

impl ResponseFrame {
    /// Resolves `status` regardless of whether the firmware put it at the
    /// top level or nested under `message`.
    pub fn status(&self) -> Option<i64> {
        self.status.or_else(|| {
            self.message
                .as_ref()
                .and_then(|m| m.get("status"))
                .and_then(Value::as_i64)
        })
    }

    /// Resolves a field that may live under `response` or under `message`,
    /// tolerating both firmware variants (see SPEC_FULL.md Open Questions).
    pub fn field(&self, name: &str) -> Option<Value> {
        self.response
            .as_ref()
            .and_then(|r| r.get(name))
            .or_else(|| self.message.as_ref().and_then(|m| m.get(name)))
            .cloned()
    }

    pub fn challenge(&self) -> Option<String> {
        self.field("challenge").and_then(|v| v.as_str().map(str::to_owned))
    }

    /// Notification items carried in `message`, normalized to a list.
    pub fn notification_items(&self) -> Vec<NotificationItem> {
        let Some(message) = &self.message else {
            return Vec::new();
        };
        let values: Vec<Value> = match message {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![message.clone()],
            _ => Vec::new(),
        };
        values
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct NotificationItem {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub eventname: Option<String>,
    #[serde(default)]
    pub eventbody: Vec<Value>,
}

/// One entry of an `ActiveCallStatus` event body. Field presence and shape
/// vary by `chantype`; unused fields are left as `None`/empty.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveCallEntry {
    pub chantype: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub linkedid: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel1: Option<String>,
    #[serde(default)]
    pub channel2: Option<String>,
    #[serde(default)]
    pub callernum: Option<String>,
    #[serde(default)]
    pub connectednum: Option<String>,
    #[serde(default)]
    pub connectedname: Option<String>,
    #[serde(default)]
    pub callerid1: Option<String>,
    #[serde(default)]
    pub callerid2: Option<String>,
    #[serde(default)]
    pub name1: Option<String>,
    #[serde(default)]
    pub name2: Option<String>,
    #[serde(default)]
    pub inbound_trunk_name: Option<String>,
    #[serde(default)]
    pub outbound_trunk_name: Option<String>,
    #[serde(default)]
    pub bridge_time: Option<String>,
    #[serde(default)]
    pub uniqueid: Option<String>,
}

impl ActiveCallEntry {
    pub fn is_unbridge(&self) -> bool {
        self.chantype.as_deref() == Some("unbridge")
    }

    pub fn is_bridge(&self) -> bool {
        self.chantype.as_deref() == Some("bridge")
    }

    pub fn is_ringing_state(&self) -> bool {
        matches!(self.state.as_deref(), Some("Ring") | Some("Ringing"))
    }

    pub fn is_down_state(&self) -> bool {
        self.state.as_deref() == Some("Down")
    }

    pub fn is_delete(&self) -> bool {
        self.action.as_deref() == Some("delete")
    }
}

/// One entry of an `ExtensionStatus` event body.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionStatusEntry {
    pub extension: String,
    pub status: String,
}
