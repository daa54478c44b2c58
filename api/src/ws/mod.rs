//! WebSocket surface: the agent socket, the dashboard socket and the
//! event plumbing they share.

pub mod agent;
pub mod dashboard;
pub mod events;
pub mod router;
pub mod topics;
pub mod types;

use axum::Router;
use axum::extract::ws::Message;
use axum::routing::get;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use util::ws::Broadcaster;

use crate::state::AppState;

pub fn ws_routes() -> Router<AppState> {
    Router::new()
        .route("/agent", get(agent::agent_ws))
        .route("/dashboard", get(dashboard::dashboard_ws))
}

/// Forwards broadcasts on `topic` into a socket's outbound queue until
/// either side goes away.
pub(crate) fn spawn_pump(
    ws: Broadcaster,
    topic: String,
    out_tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = ws.subscribe(&topic).await;
        while let Ok(msg) = rx.recv().await {
            if out_tx.send(Message::Text(msg.into())).await.is_err() {
                tracing::debug!("client gone while pumping '{topic}'");
                break;
            }
        }
    })
}
