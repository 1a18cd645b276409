//! Normalizes raw exchange notification frames and dispatches them to the
//! correlator and the extension-presence store.

use tracing::{debug, warn};

use crate::correlator::Correlator;
use crate::exchange::protocol::{ActiveCallEntry, ExtensionStatusEntry, ResponseFrame};

/// Decodes one already-parsed frame and feeds it to `correlator`.
///
/// A frame's `message` field may be a single notification object or an array
/// of them; both shapes are normalized before dispatch so the correlator
/// only ever sees a flat sequence of items.
pub async fn handle_frame(frame: &ResponseFrame, correlator: &mut Correlator) {
    for item in frame.notification_items() {
        if item.action.as_deref() != Some("notify") {
            continue;
        }
        match item.eventname.as_deref() {
            Some("ExtensionStatus") => {
                let entries: Vec<ExtensionStatusEntry> = item
                    .eventbody
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect();
                correlator.handle_extension_status(entries);
            }
            Some("ActiveCallStatus") => {
                let entries: Vec<ActiveCallEntry> = item
                    .eventbody
                    .iter()
                    .filter_map(|v| match serde_json::from_value(v.clone()) {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            debug!(error = %e, "discarding malformed ActiveCallStatus entry");
                            None
                        }
                    })
                    .collect();
                correlator.handle_active_call_status(entries).await;
            }
            Some(other) => {
                debug!(eventname = other, "ignoring unhandled notification");
            }
            None => warn!("notification item missing eventname"),
        }
    }
}
