//! Active-State Store: a thread-safe snapshot of current active calls and
//! extension presence, written exclusively by the correlator and read by
//! HTTP handlers.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::correlator::state::CallRecord;

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    calls: HashMap<String, CallRecord>,
    presence: HashMap<String, String>,
}

/// Guarded by a single mutex; readers copy out and release immediately so a
/// slow HTTP handler can never stall the correlator.
pub struct ActiveStateStore {
    inner: Mutex<Inner>,
}

impl ActiveStateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn upsert_call(&self, record: CallRecord) {
        let mut inner = self.inner.lock().expect("active-state store poisoned");
        if !inner.calls.contains_key(&record.correlation_id) {
            inner.order.push(record.correlation_id.clone());
        }
        inner.calls.insert(record.correlation_id.clone(), record);
    }

    pub fn remove_call(&self, correlation_id: &str) {
        let mut inner = self.inner.lock().expect("active-state store poisoned");
        inner.calls.remove(correlation_id);
        inner.order.retain(|id| id != correlation_id);
    }

    pub fn set_presence(&self, extension: String, status: String) {
        let mut inner = self.inner.lock().expect("active-state store poisoned");
        inner.presence.insert(extension, status);
    }

    /// Snapshot of active calls in insertion order.
    pub fn active_calls(&self) -> Vec<CallRecord> {
        let inner = self.inner.lock().expect("active-state store poisoned");
        inner
            .order
            .iter()
            .filter_map(|id| inner.calls.get(id).cloned())
            .collect()
    }

    pub fn presence_snapshot(&self) -> HashMap<String, String> {
        let inner = self.inner.lock().expect("active-state store poisoned");
        inner.presence.clone()
    }
}

impl Default for ActiveStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::state::CallRecord;

    #[test]
    fn upsert_then_remove_round_trips() {
        let store = ActiveStateStore::new();
        let record = CallRecord::new_ringing(
            "link-1".into(),
            "0712345678".into(),
            "".into(),
            "1001".into(),
        );
        store.upsert_call(record);
        assert_eq!(store.active_calls().len(), 1);
        store.remove_call("link-1");
        assert!(store.active_calls().is_empty());
    }

    #[test]
    fn active_calls_preserve_insertion_order() {
        let store = ActiveStateStore::new();
        for i in 0..3 {
            store.upsert_call(CallRecord::new_ringing(
                format!("link-{i}"),
                "0700000000".into(),
                "".into(),
                "1001".into(),
            ));
        }
        let ids: Vec<_> = store.active_calls().into_iter().map(|c| c.correlation_id).collect();
        assert_eq!(ids, vec!["link-0", "link-1", "link-2"]);
    }
}
