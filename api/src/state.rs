//! Application state shared across Axum route handlers and socket tasks.

use crate::ws::router::EventRouter;
use db::store::Store;
use std::sync::Arc;
use util::ws::Broadcaster;

/// Central application state. The router is constructed exactly once in
/// `main` and handed to every handler through this struct; nothing reaches
/// it through globals.
#[derive(Clone)]
pub struct AppState {
    ws: Broadcaster,
    store: Arc<dyn Store>,
    router: Arc<EventRouter>,
}

impl AppState {
    pub fn new(ws: Broadcaster, store: Arc<dyn Store>, router: Arc<EventRouter>) -> Self {
        Self { ws, store, router }
    }

    pub fn ws(&self) -> &Broadcaster {
        &self.ws
    }

    pub fn ws_clone(&self) -> Broadcaster {
        self.ws.clone()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }
}
