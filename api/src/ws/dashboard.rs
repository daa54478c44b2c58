//! The dashboard-facing socket.
//!
//! A dashboard subscribes once for the fleet-wide feeds and then watches
//! and unwatches individual machines as the operator opens detail views.
//! The snapshot sent on subscribe is a direct reply, not a broadcast, so
//! late joiners never replay onto other dashboards.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::DashboardIn;
use super::{spawn_pump, topics};
use crate::state::AppState;

pub async fn dashboard_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, state))
}

#[derive(Default)]
struct Subs {
    pumps: HashMap<String, JoinHandle<()>>,
}

impl Subs {
    fn add(&mut self, topic: String, pump: JoinHandle<()>) {
        if let Some(old) = self.pumps.insert(topic, pump) {
            old.abort();
        }
    }

    fn remove(&mut self, topic: &str) {
        if let Some(pump) = self.pumps.remove(topic) {
            pump.abort();
        }
    }

    fn clear(&mut self) {
        for (_, pump) in self.pumps.drain() {
            pump.abort();
        }
    }
}

async fn serve(socket: WebSocket, state: AppState) {
    let (mut sink, mut socket_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut subs = Subs::default();

    while let Some(Ok(msg)) = socket_rx.next().await {
        match msg {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<DashboardIn>(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("dashboard sent unparseable frame: {e}");
                        continue;
                    }
                };
                handle_frame(&state, &out_tx, &mut subs, frame).await;
            }
            Message::Ping(payload) => {
                let _ = out_tx.send(Message::Pong(payload)).await;
            }
            Message::Pong(_) => {}
            Message::Binary(_) => {
                tracing::warn!("ignoring binary frame on dashboard socket");
            }
            Message::Close(_) => break,
        }
    }

    subs.clear();
    writer.abort();
    tracing::debug!("dashboard socket closed");
}

async fn handle_frame(
    state: &AppState,
    out_tx: &mpsc::Sender<Message>,
    subs: &mut Subs,
    frame: DashboardIn,
) {
    match frame {
        DashboardIn::Subscribe {} => {
            subs.add(
                topics::machines_topic(),
                spawn_pump(state.ws_clone(), topics::machines_topic(), out_tx.clone()),
            );
            subs.add(
                topics::security_topic(),
                spawn_pump(state.ws_clone(), topics::security_topic(), out_tx.clone()),
            );
            match state.router().snapshot().await {
                Ok(machines) => {
                    let reply = serde_json::json!({
                        "type": "machines:list",
                        "payload": machines,
                    });
                    let _ = out_tx.send(Message::Text(reply.to_string().into())).await;
                }
                Err(e) => tracing::error!("failed to build machines snapshot: {e}"),
            }
        }
        DashboardIn::Watch { machine_id } => {
            let topic = topics::machine_topic(&machine_id);
            subs.add(
                topic.clone(),
                spawn_pump(state.ws_clone(), topic, out_tx.clone()),
            );
        }
        DashboardIn::Unwatch { machine_id } => {
            subs.remove(&topics::machine_topic(&machine_id));
        }
    }
}
