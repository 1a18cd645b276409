//! Call Correlator: the core state machine. Groups raw per-channel exchange
//! events into logical calls keyed by correlation id ("linkedid"), tracks
//! which channels belong to each call, classifies call direction, and
//! drives the active-state store, event fan-out, and call-history writer.
//!
//! Everything in this module runs on the single background task described
//! in SPEC_FULL.md section 5 — it owns its state outright and needs no
//! internal locking.

pub mod state;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::exchange::protocol::{ActiveCallEntry, ExtensionStatusEntry};
use crate::fanout::{Fanout, FanoutEvent};
use crate::history::HistoryWriter;
use crate::store::ActiveStateStore;

use state::{CallRecord, CallState, ChannelIndex, CorrelationId, ExtensionPresence, InboundCorrelationSet};

pub struct Correlator {
    channel_index: ChannelIndex,
    inbound_calls: InboundCorrelationSet,
    presence: ExtensionPresence,
    active_calls: std::collections::HashMap<CorrelationId, CallRecord>,
    store: Arc<ActiveStateStore>,
    fanout: Arc<Fanout>,
    history: HistoryWriter,
}

impl Correlator {
    pub fn new(store: Arc<ActiveStateStore>, fanout: Arc<Fanout>, history: HistoryWriter) -> Self {
        Self {
            channel_index: ChannelIndex::new(),
            inbound_calls: InboundCorrelationSet::new(),
            presence: ExtensionPresence::new(),
            active_calls: std::collections::HashMap::new(),
            store,
            fanout,
            history,
        }
    }

    /// Clears all in-flight correlation state. Called whenever the exchange
    /// connection is lost — the exchange will re-announce current state once
    /// reconnected, but stale channel/call bookkeeping would otherwise leak.
    pub fn reset(&mut self) {
        self.channel_index = ChannelIndex::new();
        self.inbound_calls = InboundCorrelationSet::new();
        self.active_calls.clear();
        debug!("correlator state reset after connection loss");
    }

    pub fn handle_extension_status(&mut self, entries: Vec<ExtensionStatusEntry>) {
        for entry in entries {
            self.presence.set(entry.extension.clone(), entry.status.clone());
            self.store.set_presence(entry.extension.clone(), entry.status.clone());
            self.fanout.publish(FanoutEvent::presence(json!({
                "extension": entry.extension,
                "status": entry.status,
            })));
        }
    }

    pub async fn handle_active_call_status(&mut self, mut entries: Vec<ActiveCallEntry>) {
        // Trunk channels first so InboundCorrelationSet is populated before
        // any extension-side channel of the same call is examined.
        entries.sort_by_key(|e| e.inbound_trunk_name.is_none());

        for entry in entries {
            if entry.is_unbridge() {
                self.handle_unbridge(&entry).await;
            } else if entry.is_bridge() {
                self.handle_bridge(&entry).await;
            }
        }
    }

    async fn handle_unbridge(&mut self, entry: &ActiveCallEntry) {
        if entry.is_delete() || entry.is_down_state() {
            self.terminate_channel(entry.channel.as_deref().unwrap_or_default()).await;
            return;
        }

        if !entry.is_ringing_state() {
            return;
        }

        let Some(linkedid) = entry.linkedid.clone().filter(|s| !s.is_empty()) else {
            return;
        };
        if let Some(channel) = entry.channel.as_deref().filter(|c| !c.is_empty()) {
            self.channel_index.insert(channel, &linkedid);
        }

        if let Some(trunk) = &entry.inbound_trunk_name {
            if !trunk.is_empty() {
                self.inbound_calls.insert(linkedid.clone());
                return;
            }
        }

        if !self.inbound_calls.contains(&linkedid) {
            // Internal or outbound ringing: not surfaced on the active-calls panel.
            return;
        }

        let extension = entry.callernum.clone().unwrap_or_default();

        if let Some(existing) = self.active_calls.get_mut(&linkedid) {
            if existing.state == CallState::Ringing && !existing.internal_extensions.contains(&extension) {
                existing.internal_extensions.push(extension);
                self.store.upsert_call(existing.clone());
            }
            return;
        }

        let record = CallRecord::new_ringing(
            linkedid.clone(),
            entry.connectednum.clone().unwrap_or_default(),
            entry.connectedname.clone().unwrap_or_default(),
            extension,
        );
        self.active_calls.insert(linkedid.clone(), record.clone());
        self.store.upsert_call(record.clone());
        self.fanout.publish(FanoutEvent::ring(json!({
            "correlation_id": record.correlation_id,
            "external_number": record.external_number,
            "external_name": record.external_name,
            "internal_extensions": record.internal_extensions,
        })));
        self.history
            .insert_inbound_ring(&linkedid, &record.external_number)
            .await;
    }

    async fn handle_bridge(&mut self, entry: &ActiveCallEntry) {
        let Some(linkedid) = self.resolve_bridge_correlation(entry) else {
            return;
        };

        if entry.is_delete() {
            self.terminate_channel_for(&linkedid, entry).await;
            return;
        }

        for channel in [entry.channel.as_deref(), entry.channel1.as_deref(), entry.channel2.as_deref()]
            .into_iter()
            .flatten()
            .filter(|c| !c.is_empty())
        {
            self.channel_index.insert(channel, &linkedid);
        }

        let Some((external_number, internal_ext, internal_name)) = extract_bridge_parties(entry) else {
            debug!(%linkedid, "bridge with no identifiable trunk leg, skipping history write");
            return;
        };

        let is_outbound = entry
            .outbound_trunk_name
            .as_ref()
            .is_some_and(|t| !t.is_empty())
            && entry.inbound_trunk_name.as_ref().map_or(true, |t| t.is_empty());

        let bridge_time = parse_bridge_time(entry.bridge_time.as_deref()).unwrap_or_else(Utc::now);

        if is_outbound && !external_number.is_empty() {
            self.history
                .insert_outbound(&linkedid, bridge_time, &external_number, &internal_ext, &internal_name)
                .await;
        }

        if self.inbound_calls.contains(&linkedid) {
            self.history
                .mark_inbound_answered(&linkedid, &internal_ext, &internal_name, bridge_time)
                .await;

            if let Some(ringing) = self.active_calls.get(&linkedid) {
                if ringing.state != CallState::Ringing {
                    return;
                }
                let connected = CallRecord {
                    correlation_id: linkedid.clone(),
                    state: CallState::Connected,
                    external_number: if external_number.is_empty() {
                        ringing.external_number.clone()
                    } else {
                        external_number
                    },
                    external_name: ringing.external_name.clone(),
                    internal_extensions: vec![internal_ext.clone()],
                    internal_name,
                    bridge_time: Some(bridge_time),
                };
                self.active_calls.insert(linkedid.clone(), connected.clone());
                self.store.upsert_call(connected.clone());
                self.fanout.publish(FanoutEvent::connect(json!({
                    "correlation_id": connected.correlation_id,
                    "external_number": connected.external_number,
                    "internal_extension": internal_ext,
                    "internal_name": connected.internal_name,
                })));
            }
        }
    }

    fn resolve_bridge_correlation(&self, entry: &ActiveCallEntry) -> Option<CorrelationId> {
        if let Some(id) = entry.linkedid.clone().filter(|s| !s.is_empty()) {
            return Some(id);
        }
        for channel in [entry.channel1.as_deref(), entry.channel2.as_deref(), entry.channel.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(id) = self.channel_index.correlation_for(channel) {
                return Some(id);
            }
        }
        if entry.outbound_trunk_name.as_ref().is_some_and(|t| !t.is_empty()) {
            return entry
                .uniqueid
                .clone()
                .or_else(|| entry.channel.clone())
                .filter(|s| !s.is_empty());
        }
        None
    }

    async fn terminate_channel(&mut self, channel: &str) {
        if channel.is_empty() {
            return;
        }
        if let Some((correlation_id, emptied)) = self.channel_index.remove_channel(channel) {
            if emptied {
                self.finalize_call(&correlation_id).await;
            }
        }
    }

    async fn terminate_channel_for(&mut self, linkedid: &str, entry: &ActiveCallEntry) {
        for channel in [entry.channel1.as_deref(), entry.channel2.as_deref(), entry.channel.as_deref()]
            .into_iter()
            .flatten()
            .filter(|c| !c.is_empty())
        {
            self.channel_index.remove_channel(channel);
        }
        if self.channel_index.channel_count(&linkedid.to_string()) == 0 {
            self.finalize_call(linkedid).await;
        }
    }

    async fn finalize_call(&mut self, correlation_id: &str) {
        let had_record = self.active_calls.remove(correlation_id).is_some();
        self.inbound_calls.remove(&correlation_id.to_string());
        self.store.remove_call(correlation_id);
        if had_record {
            self.fanout.publish(FanoutEvent::hangup(json!({
                "correlation_id": correlation_id,
            })));
        }
        self.history.finalize(correlation_id).await;
    }
}

/// Identifies the external (trunk) and internal legs of a bridged call.
/// The channel whose name contains "trunk" (case-insensitive) is external.
/// Returns `None` when neither leg can be identified as the trunk side —
/// the caller logs and skips the history write rather than fabricating a
/// party from whichever fields happen to be present.
fn extract_bridge_parties(entry: &ActiveCallEntry) -> Option<(String, String, String)> {
    let ch1_is_trunk = entry
        .channel1
        .as_deref()
        .is_some_and(|c| c.to_lowercase().contains("trunk"));
    let ch2_is_trunk = entry
        .channel2
        .as_deref()
        .is_some_and(|c| c.to_lowercase().contains("trunk"));

    if ch1_is_trunk && !ch2_is_trunk {
        Some((
            entry.callerid1.clone().unwrap_or_default(),
            entry.callerid2.clone().unwrap_or_default(),
            entry.name2.clone().unwrap_or_default(),
        ))
    } else if ch2_is_trunk && !ch1_is_trunk {
        Some((
            entry.callerid2.clone().unwrap_or_default(),
            entry.callerid1.clone().unwrap_or_default(),
            entry.name1.clone().unwrap_or_default(),
        ))
    } else {
        None
    }
}

fn parse_bridge_time(raw: Option<&str>) -> Option<chrono::DateTime<Utc>> {
    let raw = raw?;
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryWriter;

    async fn new_correlator() -> (Correlator, Arc<ActiveStateStore>, Arc<Fanout>) {
        let store = Arc::new(ActiveStateStore::new());
        let fanout = Arc::new(Fanout::new());
        let history = HistoryWriter::connect_in_memory().await.unwrap();
        (Correlator::new(store.clone(), fanout.clone(), history), store, fanout)
    }

    fn ring_entry(linkedid: &str, channel: &str, trunk: bool) -> ActiveCallEntry {
        ActiveCallEntry {
            chantype: Some("unbridge".into()),
            action: Some("add".into()),
            state: Some("Ring".into()),
            linkedid: Some(linkedid.into()),
            channel: Some(channel.into()),
            channel1: None,
            channel2: None,
            callernum: Some("1001".into()),
            connectednum: Some("0712345678".into()),
            connectedname: Some("".into()),
            callerid1: None,
            callerid2: None,
            name1: None,
            name2: None,
            inbound_trunk_name: if trunk { Some("trunk-1".into()) } else { None },
            outbound_trunk_name: None,
            bridge_time: None,
            uniqueid: None,
        }
    }

    #[tokio::test]
    async fn simple_inbound_ring_then_hangup() {
        let (mut correlator, store, _fanout) = new_correlator().await;

        // trunk leg arrives first (establishes inbound correlation)
        correlator
            .handle_active_call_status(vec![ring_entry("link-1", "Trunk/1-001", true)])
            .await;
        // extension leg rings
        correlator
            .handle_active_call_status(vec![ring_entry("link-1", "SIP/1001-002", false)])
            .await;

        assert_eq!(store.active_calls().len(), 1);

        let hangup = ActiveCallEntry {
            chantype: Some("unbridge".into()),
            action: Some("delete".into()),
            state: None,
            linkedid: None,
            channel: Some("SIP/1001-002".into()),
            channel1: None,
            channel2: None,
            callernum: None,
            connectednum: None,
            connectedname: None,
            callerid1: None,
            callerid2: None,
            name1: None,
            name2: None,
            inbound_trunk_name: None,
            outbound_trunk_name: None,
            bridge_time: None,
            uniqueid: None,
        };
        correlator.handle_active_call_status(vec![hangup]).await;
        // trunk channel still open; call should remain until it too is deleted
        assert_eq!(store.active_calls().len(), 1);

        let trunk_hangup = ActiveCallEntry {
            chantype: Some("unbridge".into()),
            action: Some("delete".into()),
            state: None,
            linkedid: None,
            channel: Some("Trunk/1-001".into()),
            channel1: None,
            channel2: None,
            callernum: None,
            connectednum: None,
            connectedname: None,
            callerid1: None,
            callerid2: None,
            name1: None,
            name2: None,
            inbound_trunk_name: None,
            outbound_trunk_name: None,
            bridge_time: None,
            uniqueid: None,
        };
        correlator.handle_active_call_status(vec![trunk_hangup]).await;
        assert!(store.active_calls().is_empty());
    }

    #[tokio::test]
    async fn internal_call_is_not_surfaced() {
        let (mut correlator, store, _fanout) = new_correlator().await;
        correlator
            .handle_active_call_status(vec![ring_entry("link-internal", "SIP/1002-001", false)])
            .await;
        assert!(store.active_calls().is_empty());
    }

    #[tokio::test]
    async fn ring_group_growth_does_not_duplicate_call() {
        let (mut correlator, store, _fanout) = new_correlator().await;
        correlator
            .handle_active_call_status(vec![ring_entry("link-rg", "Trunk/1-010", true)])
            .await;
        correlator
            .handle_active_call_status(vec![ring_entry("link-rg", "SIP/1001-010", false)])
            .await;
        let mut second = ring_entry("link-rg", "SIP/1002-010", false);
        second.callernum = Some("1002".into());
        correlator.handle_active_call_status(vec![second]).await;

        let calls = store.active_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].internal_extensions, vec!["1001", "1002"]);
    }
}
