//! End-to-end scenarios for the call correlator, exercised the way the
//! exchange actually delivers events: batches of channel entries handed to
//! `Correlator::handle_active_call_status`, observed through the
//! active-state store, the fan-out stream, and the call-history log.

use std::sync::Arc;
use std::time::Duration;

use ucm_call_monitor::correlator::state::CallState;
use ucm_call_monitor::correlator::Correlator;
use ucm_call_monitor::exchange::protocol::ActiveCallEntry;
use ucm_call_monitor::fanout::{Fanout, FanoutEvent};
use ucm_call_monitor::history::HistoryWriter;
use ucm_call_monitor::store::ActiveStateStore;

fn entry() -> ActiveCallEntry {
    ActiveCallEntry {
        chantype: None,
        action: None,
        state: None,
        linkedid: None,
        channel: None,
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
    }
}

fn unbridge_ring(linkedid: &str, channel: &str, trunk: Option<&str>, callernum: &str, connectednum: &str) -> ActiveCallEntry {
    ActiveCallEntry {
        chantype: Some("unbridge".into()),
        action: Some("add".into()),
        state: Some("Ring".into()),
        linkedid: Some(linkedid.into()),
        channel: Some(channel.into()),
        callernum: Some(callernum.into()),
        connectednum: Some(connectednum.into()),
        connectedname: Some("Mario Rossi".into()),
        inbound_trunk_name: trunk.map(str::to_string),
        ..entry()
    }
}

fn unbridge_delete(channel: &str) -> ActiveCallEntry {
    ActiveCallEntry {
        chantype: Some("unbridge".into()),
        action: Some("delete".into()),
        channel: Some(channel.into()),
        ..entry()
    }
}

fn bridge_add(
    linkedid: &str,
    channel1: &str,
    channel2: &str,
    callerid1: &str,
    callerid2: &str,
    name1: &str,
    name2: &str,
    outbound_trunk: Option<&str>,
) -> ActiveCallEntry {
    ActiveCallEntry {
        chantype: Some("bridge".into()),
        action: Some("add".into()),
        linkedid: Some(linkedid.into()),
        channel1: Some(channel1.into()),
        channel2: Some(channel2.into()),
        callerid1: Some(callerid1.into()),
        callerid2: Some(callerid2.into()),
        name1: Some(name1.into()),
        name2: Some(name2.into()),
        outbound_trunk_name: outbound_trunk.map(str::to_string),
        bridge_time: Some("2024-03-01 10:00:05".into()),
        ..entry()
    }
}

fn bridge_delete(channel1: &str, channel2: &str) -> ActiveCallEntry {
    ActiveCallEntry {
        chantype: Some("bridge".into()),
        action: Some("delete".into()),
        channel1: Some(channel1.into()),
        channel2: Some(channel2.into()),
        ..entry()
    }
}

struct Harness {
    correlator: Correlator,
    store: Arc<ActiveStateStore>,
    fanout: Arc<Fanout>,
}

async fn harness() -> Harness {
    let store = Arc::new(ActiveStateStore::new());
    let fanout = Arc::new(Fanout::new());
    let history = HistoryWriter::connect_in_memory().await.unwrap();
    let correlator = Correlator::new(store.clone(), fanout.clone(), history);
    Harness { correlator, store, fanout }
}

/// S1: a simple inbound call is rung, answered, then both legs hang up.
#[tokio::test]
async fn s1_simple_inbound_answered_then_hangup() {
    let mut h = harness().await;
    let mut events = h.fanout.subscribe();

    h.correlator
        .handle_active_call_status(vec![unbridge_ring("L1", "PJSIP/trunk-01", Some("TRUNK"), "1000", "+390123456")])
        .await;
    h.correlator
        .handle_active_call_status(vec![unbridge_ring("L1", "PJSIP/1000-02", None, "1000", "+390123456")])
        .await;

    let calls = h.store.active_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].internal_extensions, vec!["1000"]);

    h.correlator
        .handle_active_call_status(vec![bridge_add(
            "L1",
            "PJSIP/trunk-01",
            "PJSIP/1000-02",
            "+390123456",
            "1000",
            "Mario Rossi",
            "Reception",
            None,
        )])
        .await;

    let calls = h.store.active_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].state, CallState::Connected);

    h.correlator
        .handle_active_call_status(vec![unbridge_delete("PJSIP/trunk-01"), unbridge_delete("PJSIP/1000-02")])
        .await;
    h.correlator
        .handle_active_call_status(vec![bridge_delete("PJSIP/trunk-01", "PJSIP/1000-02")])
        .await;

    assert!(h.store.active_calls().is_empty());

    let ring = events.recv().await.unwrap();
    assert_eq!(ring.event, "call_ring");
    let connect = events.recv().await.unwrap();
    assert_eq!(connect.event, "call_connect");
    let hangup = events.recv().await.unwrap();
    assert_eq!(hangup.event, "call_hangup");
}

/// S2: a ring group grows, one branch answers, everything else tears down.
#[tokio::test]
async fn s2_ring_group_one_branch_answers() {
    let mut h = harness().await;
    let mut events = h.fanout.subscribe();

    h.correlator
        .handle_active_call_status(vec![unbridge_ring("L2", "PJSIP/trunk-02", Some("TRUNK"), "0", "+390999888")])
        .await;
    for ext in ["1000", "1001", "1002"] {
        h.correlator
            .handle_active_call_status(vec![unbridge_ring("L2", &format!("PJSIP/{ext}-02"), None, ext, "+390999888")])
            .await;
    }

    let calls = h.store.active_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].internal_extensions, vec!["1000", "1001", "1002"]);

    h.correlator
        .handle_active_call_status(vec![bridge_add(
            "L2",
            "PJSIP/trunk-02",
            "PJSIP/1001-02",
            "+390999888",
            "1001",
            "",
            "Sales",
            None,
        )])
        .await;

    for ext in ["1000", "1001", "1002"] {
        h.correlator
            .handle_active_call_status(vec![unbridge_delete(&format!("PJSIP/{ext}-02"))])
            .await;
    }
    h.correlator
        .handle_active_call_status(vec![unbridge_delete("PJSIP/trunk-02")])
        .await;
    h.correlator
        .handle_active_call_status(vec![bridge_delete("PJSIP/trunk-02", "PJSIP/1001-02")])
        .await;

    assert!(h.store.active_calls().is_empty());

    let mut seen = Vec::new();
    while let Ok(ev) = events.try_recv() {
        seen.push(ev.event);
    }
    assert_eq!(seen.iter().filter(|e| **e == "call_ring").count(), 1);
    assert_eq!(seen.iter().filter(|e| **e == "call_connect").count(), 1);
    assert_eq!(seen.iter().filter(|e| **e == "call_hangup").count(), 1);
}

/// S3: outbound click-to-dial bridge is logged but never surfaced to the
/// active-calls panel.
#[tokio::test]
async fn s3_outbound_bridge_is_logged_not_surfaced() {
    let mut h = harness().await;
    let mut events = h.fanout.subscribe();

    h.correlator
        .handle_active_call_status(vec![bridge_add(
            "L3",
            "PJSIP/1000-x",
            "PJSIP/trunk-y",
            "1000",
            "+390987654",
            "Reception",
            "",
            Some("TRUNK-OUT"),
        )])
        .await;

    assert!(h.store.active_calls().is_empty());
    assert!(events.try_recv().is_err());

    h.correlator
        .handle_active_call_status(vec![bridge_delete("PJSIP/1000-x", "PJSIP/trunk-y")])
        .await;
}

/// S4: a missed inbound call (rung, never bridged, then hung up) is
/// surfaced and hung up but never marked answered.
#[tokio::test]
async fn s4_missed_inbound_call() {
    let mut h = harness().await;
    let mut events = h.fanout.subscribe();

    h.correlator
        .handle_active_call_status(vec![unbridge_ring("L4", "PJSIP/trunk-04", Some("TRUNK"), "0", "+390111222")])
        .await;
    h.correlator
        .handle_active_call_status(vec![unbridge_ring("L4", "PJSIP/1000-04", None, "1000", "+390111222")])
        .await;

    h.correlator
        .handle_active_call_status(vec![unbridge_delete("PJSIP/trunk-04"), unbridge_delete("PJSIP/1000-04")])
        .await;

    assert!(h.store.active_calls().is_empty());
    let ring = events.recv().await.unwrap();
    assert_eq!(ring.event, "call_ring");
    let hangup = events.recv().await.unwrap();
    assert_eq!(hangup.event, "call_hangup");
}

/// S5: losing the exchange session mid-call clears in-flight state; a fresh
/// call after reconnect is processed normally.
#[tokio::test]
async fn s5_session_loss_mid_call_resets_state() {
    let mut h = harness().await;

    h.correlator
        .handle_active_call_status(vec![unbridge_ring("L5", "PJSIP/trunk-05", Some("TRUNK"), "0", "+390333444")])
        .await;
    h.correlator
        .handle_active_call_status(vec![unbridge_ring("L5", "PJSIP/1000-05", None, "1000", "+390333444")])
        .await;
    h.correlator
        .handle_active_call_status(vec![bridge_add(
            "L5",
            "PJSIP/trunk-05",
            "PJSIP/1000-05",
            "+390333444",
            "1000",
            "",
            "Reception",
            None,
        )])
        .await;

    assert_eq!(h.store.active_calls().len(), 1);

    // Transport failure: the exchange client calls reset() before retrying.
    h.correlator.reset();
    assert!(h.store.active_calls().is_empty());

    // A fresh call after reconnect is processed normally.
    h.correlator
        .handle_active_call_status(vec![unbridge_ring("L6", "PJSIP/trunk-06", Some("TRUNK"), "0", "+390555666")])
        .await;
    h.correlator
        .handle_active_call_status(vec![unbridge_ring("L6", "PJSIP/1001-06", None, "1001", "+390555666")])
        .await;
    assert_eq!(h.store.active_calls().len(), 1);
}

/// S6: a slow SSE subscriber never blocks publication, and a backlogged
/// subscriber's drop doesn't affect other subscribers.
#[tokio::test]
async fn s6_slow_subscriber_does_not_block_others() {
    let fanout = Fanout::new();
    let mut slow = fanout.subscribe();
    let mut fast = fanout.subscribe();

    for i in 0..50 {
        fanout.publish(FanoutEvent::presence(serde_json::json!({ "seq": i })));
    }

    let mut slow_count = 0;
    while tokio::time::timeout(Duration::from_millis(10), slow.recv()).await.is_ok() {
        slow_count += 1;
    }
    assert!(slow_count <= 32);

    let mut fast_count = 0;
    while tokio::time::timeout(Duration::from_millis(10), fast.recv()).await.is_ok() {
        fast_count += 1;
    }
    assert_eq!(fast_count, slow_count);
}

/// Boundary: a ring event with no linkedid is dropped with no state change.
#[tokio::test]
async fn ring_with_empty_linkedid_is_dropped() {
    let mut h = harness().await;
    let mut stray = unbridge_ring("unused", "PJSIP/1000-99", Some("TRUNK"), "1000", "+390000000");
    stray.linkedid = None;
    h.correlator.handle_active_call_status(vec![stray]).await;
    assert!(h.store.active_calls().is_empty());
}

/// Boundary: deleting an unknown channel is a no-op.
#[tokio::test]
async fn delete_of_unknown_channel_is_noop() {
    let mut h = harness().await;
    h.correlator
        .handle_active_call_status(vec![unbridge_delete("PJSIP/never-seen-01")])
        .await;
    assert!(h.store.active_calls().is_empty());
}

/// History: an inbound call is written to the log through the full
/// correlator lifecycle (ring, answer, hangup), read back through a second
/// connection to the same on-disk database.
#[tokio::test]
async fn history_records_answered_inbound_call_end_to_end() {
    let path = temp_db_path("history_answered");
    let store = Arc::new(ActiveStateStore::new());
    let fanout = Arc::new(Fanout::new());
    let history = HistoryWriter::connect(&path).await.unwrap();
    let mut correlator = Correlator::new(store, fanout, history);

    correlator
        .handle_active_call_status(vec![unbridge_ring("L7", "PJSIP/trunk-07", Some("TRUNK"), "0", "+390777888")])
        .await;
    correlator
        .handle_active_call_status(vec![unbridge_ring("L7", "PJSIP/1000-07", None, "1000", "+390777888")])
        .await;
    correlator
        .handle_active_call_status(vec![bridge_add(
            "L7",
            "PJSIP/trunk-07",
            "PJSIP/1000-07",
            "+390777888",
            "1000",
            "",
            "Reception",
            None,
        )])
        .await;
    correlator
        .handle_active_call_status(vec![unbridge_delete("PJSIP/trunk-07"), unbridge_delete("PJSIP/1000-07")])
        .await;
    correlator
        .handle_active_call_status(vec![bridge_delete("PJSIP/trunk-07", "PJSIP/1000-07")])
        .await;

    let reader = HistoryWriter::connect(&path).await.unwrap();
    let rows = reader.recent(10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].direction, "inbound");
    assert!(rows[0].answered);
    assert_eq!(rows[0].internal_ext, "1000");

    let _ = std::fs::remove_file(&path);
}

/// History: a missed inbound call (hangup before bridge) keeps answered=0
/// and duration=0.
#[tokio::test]
async fn history_keeps_zero_duration_for_missed_call() {
    let path = temp_db_path("history_missed");
    let store = Arc::new(ActiveStateStore::new());
    let fanout = Arc::new(Fanout::new());
    let history = HistoryWriter::connect(&path).await.unwrap();
    let mut correlator = Correlator::new(store, fanout, history);

    correlator
        .handle_active_call_status(vec![unbridge_ring("L8", "PJSIP/trunk-08", Some("TRUNK"), "0", "+390888999")])
        .await;
    correlator
        .handle_active_call_status(vec![unbridge_ring("L8", "PJSIP/1000-08", None, "1000", "+390888999")])
        .await;
    correlator
        .handle_active_call_status(vec![unbridge_delete("PJSIP/trunk-08"), unbridge_delete("PJSIP/1000-08")])
        .await;

    let reader = HistoryWriter::connect(&path).await.unwrap();
    let rows = reader.recent(10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].answered);
    assert_eq!(rows[0].duration, 0);

    let _ = std::fs::remove_file(&path);
}

fn temp_db_path(label: &str) -> String {
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir()
        .join(format!("ucm_call_monitor_test_{label}_{pid}_{nanos}.db"))
        .to_string_lossy()
        .into_owned()
}
