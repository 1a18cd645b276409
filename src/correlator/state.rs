use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Exchange-assigned identifier shared by every channel of one logical call.
pub type CorrelationId = String;

/// A call as currently known to the correlator, suitable for the active-calls panel.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub correlation_id: CorrelationId,
    pub state: CallState,
    pub external_number: String,
    pub external_name: String,
    /// Internal extensions ringing or bridged for this call, insertion-ordered.
    pub internal_extensions: Vec<String>,
    pub internal_name: String,
    pub bridge_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Ringing,
    Connected,
}

impl CallRecord {
    pub fn new_ringing(
        correlation_id: CorrelationId,
        external_number: String,
        external_name: String,
        first_extension: String,
    ) -> Self {
        Self {
            correlation_id,
            state: CallState::Ringing,
            external_number,
            external_name,
            internal_extensions: vec![first_extension],
            internal_name: String::new(),
            bridge_time: None,
        }
    }
}

/// Bidirectional mapping between transport channels and the correlation id
/// they belong to. Needed because termination events carry only a channel
/// name, never a correlation id.
#[derive(Debug, Default)]
pub struct ChannelIndex {
    channel_to_call: HashMap<String, CorrelationId>,
    call_to_channels: HashMap<CorrelationId, HashSet<String>>,
}

impl ChannelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: &str, correlation_id: &CorrelationId) {
        if channel.is_empty() {
            return;
        }
        self.channel_to_call
            .insert(channel.to_string(), correlation_id.clone());
        self.call_to_channels
            .entry(correlation_id.clone())
            .or_default()
            .insert(channel.to_string());
    }

    pub fn correlation_for(&self, channel: &str) -> Option<CorrelationId> {
        self.channel_to_call.get(channel).cloned()
    }

    /// Removes `channel` from the index. Returns `true` if the owning call
    /// now has no channels left and should be finalized.
    pub fn remove_channel(&mut self, channel: &str) -> Option<(CorrelationId, bool)> {
        let correlation_id = self.channel_to_call.remove(channel)?;
        let emptied = if let Some(channels) = self.call_to_channels.get_mut(&correlation_id) {
            channels.remove(channel);
            channels.is_empty()
        } else {
            true
        };
        if emptied {
            self.call_to_channels.remove(&correlation_id);
        }
        Some((correlation_id, emptied))
    }

    pub fn channel_count(&self, correlation_id: &CorrelationId) -> usize {
        self.call_to_channels
            .get(correlation_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

/// Set of correlation ids whose call originated on an inbound trunk.
#[derive(Debug, Default)]
pub struct InboundCorrelationSet(HashSet<CorrelationId>);

impl InboundCorrelationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: CorrelationId) {
        self.0.insert(id);
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.0.contains(id)
    }

    pub fn remove(&mut self, id: &CorrelationId) {
        self.0.remove(id);
    }
}

/// Latest reported presence status per extension, last-write-wins.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExtensionPresence(HashMap<String, String>);

impl ExtensionPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, extension: String, status: String) {
        self.0.insert(extension, status);
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.0.clone()
    }
}

/// Per-correlation metadata the history writer needs between the ring/bridge
/// event and the eventual hangup, kept outside the persisted row itself.
#[derive(Debug, Clone, Default)]
pub struct PendingHistory {
    pub bridge_time: Option<DateTime<Utc>>,
}
