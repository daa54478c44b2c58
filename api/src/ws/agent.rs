//! The agent-facing socket.
//!
//! An agent must authenticate with a `machine:connect` frame before any
//! telemetry is accepted. Once connected, the socket pumps the machine's
//! `agent:{id}` topic back down so commands and settings pushes reach the
//! agent over the same connection it reports on.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::router::{ConnectOutcome, RouterError};
use super::types::{AgentIn, AgentOut};
use super::{spawn_pump, topics};
use crate::state::AppState;

pub async fn agent_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve(socket, state, addr))
}

struct Session {
    machine_id: String,
    conn_id: u64,
    pump: JoinHandle<()>,
}

async fn serve(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (mut sink, mut socket_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut session: Option<Session> = None;

    while let Some(Ok(msg)) = socket_rx.next().await {
        match msg {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<AgentIn>(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("agent sent unparseable frame from {addr}: {e}");
                        send(&out_tx, AgentOut::Error { message: format!("bad frame: {e}") }).await;
                        continue;
                    }
                };
                if handle_frame(&state, &out_tx, &mut session, frame, addr).await {
                    break;
                }
            }
            Message::Ping(payload) => {
                let _ = out_tx.send(Message::Pong(payload)).await;
            }
            Message::Pong(_) => {}
            Message::Binary(_) => {
                tracing::warn!("ignoring binary frame on agent socket from {addr}");
            }
            Message::Close(_) => break,
        }
    }

    if let Some(s) = session {
        s.pump.abort();
        state.router().disconnect(&s.machine_id, s.conn_id).await;
    }
    writer.abort();
    tracing::info!("agent socket from {addr} closed");
}

/// Returns `true` when the socket should close.
async fn handle_frame(
    state: &AppState,
    out_tx: &mpsc::Sender<Message>,
    session: &mut Option<Session>,
    frame: AgentIn,
    addr: SocketAddr,
) -> bool {
    if let AgentIn::Connect(connect) = &frame {
        match state.router().connect(connect, Some(addr.ip().to_string())).await {
            Ok(ConnectOutcome::Accepted { machine, conn_id }) => {
                if let Some(old) = session.take() {
                    old.pump.abort();
                    state.router().disconnect(&old.machine_id, old.conn_id).await;
                }
                let pump = spawn_pump(
                    state.ws_clone(),
                    topics::agent_topic(&machine.id),
                    out_tx.clone(),
                );
                *session = Some(Session {
                    machine_id: machine.id,
                    conn_id,
                    pump,
                });
                send(out_tx, AgentOut::Ack { event: "machine:connect".into() }).await;
            }
            Ok(ConnectOutcome::Archived) => {
                // Tell the agent to stand down, then close.
                send(
                    out_tx,
                    AgentOut::Archived {
                        machine_id: connect.machine_id.clone(),
                        timestamp: chrono::Utc::now(),
                    },
                )
                .await;
                return true;
            }
            Err(RouterError::InvalidCredentials) => {
                tracing::warn!("rejected connect from {addr}: bad credentials");
                send(out_tx, AgentOut::Error { message: "invalid credentials".into() }).await;
                return true;
            }
            Err(e) => {
                tracing::error!("connect from {addr} failed: {e}");
                send(out_tx, AgentOut::Error { message: "internal error".into() }).await;
                return true;
            }
        }
        return false;
    }

    let Some(active) = session.as_ref() else {
        send(out_tx, AgentOut::Error { message: "connect first".into() }).await;
        return false;
    };
    if frame_machine_id(&frame) != active.machine_id {
        send(out_tx, AgentOut::Error { message: "machine id mismatch".into() }).await;
        return false;
    }

    let result = match frame {
        AgentIn::Connect(_) => unreachable!("handled above"),
        AgentIn::Heartbeat(f) => state.router().heartbeat(f).await.map(|_| ()),
        AgentIn::Activity(f) => state.router().activity(f).await.map(|_| ()),
        AgentIn::Audit(f) => state.router().audit(f).await.map(|_| ()),
        AgentIn::Screenshot(f) => state.router().screenshot(f).await.map(|_| ()),
    };
    if let Err(e) = result {
        tracing::warn!("agent frame from {} failed: {e}", active.machine_id);
        send(out_tx, AgentOut::Error { message: e.to_string() }).await;
    }
    false
}

fn frame_machine_id(frame: &AgentIn) -> &str {
    match frame {
        AgentIn::Connect(f) => &f.machine_id,
        AgentIn::Heartbeat(f) => &f.machine_id,
        AgentIn::Activity(f) => &f.machine_id,
        AgentIn::Audit(f) => &f.machine_id,
        AgentIn::Screenshot(f) => &f.machine_id,
    }
}

async fn send(out_tx: &mpsc::Sender<Message>, frame: AgentOut) {
    if let Ok(json) = serde_json::to_string(&frame) {
        let _ = out_tx.send(Message::Text(json.into())).await;
    }
}
