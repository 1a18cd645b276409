//! Thin HTTP surface: exposes the active-state store, the SSE event stream,
//! and the click-to-dial action. See SPEC_FULL.md section 4.8.

pub mod dto;
pub mod routes;
pub mod sse;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::directory::ContactDirectory;
use crate::exchange::DialClient;
use crate::fanout::Fanout;
use crate::store::ActiveStateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ActiveStateStore>,
    pub fanout: Arc<Fanout>,
    pub dial_client: Arc<DialClient>,
    pub directory: Arc<dyn ContactDirectory>,
    exchange_up: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        store: Arc<ActiveStateStore>,
        fanout: Arc<Fanout>,
        dial_client: Arc<DialClient>,
        directory: Arc<dyn ContactDirectory>,
        exchange_up: Arc<AtomicBool>,
    ) -> Self {
        Self { store, fanout, dial_client, directory, exchange_up }
    }

    pub fn exchange_connected(&self) -> bool {
        self.exchange_up.load(Ordering::Relaxed)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(routes::health))
        .route("/api/call", post(routes::dial))
        .route("/api/calls", get(routes::active_calls))
        .route("/api/extensions", get(routes::extensions))
        .route("/api/lookup/:number", get(routes::lookup))
        .route("/api/events", get(sse::events))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
