//! Server-emitted WebSocket events.
//!
//! Each event knows its own name and topic, so a call site can never pair
//! a payload with the wrong channel. Everything goes out wrapped in the
//! standard envelope via [`emit`].

use chrono::{DateTime, Utc};
use db::models::{activity_session, audit_event, machine, screenshot};
use db::settings::MachineSettings;
use serde::Serialize;
use util::ws::Broadcaster;

use super::topics;
use crate::presence::Presence;

pub trait Event: Serialize {
    const NAME: &'static str;
    fn topic_path(&self) -> String;
}

pub async fn emit<E: Event>(ws: &Broadcaster, event: &E) {
    util::ws::emit(ws, &event.topic_path(), E::NAME, event).await;
}

/* ---------- fleet-wide lifecycle ---------- */

/// Pure lifecycle record. Presence classification is never attached here;
/// dashboards get it from `machine:state`, which goes through the shared
/// resolver.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineOnline {
    pub machine_id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}
impl Event for MachineOnline {
    const NAME: &'static str = "machine:online";
    fn topic_path(&self) -> String {
        topics::machines_topic()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineOffline {
    pub machine_id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}
impl Event for MachineOffline {
    const NAME: &'static str = "machine:offline";
    fn topic_path(&self) -> String {
        topics::machines_topic()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDiscovered {
    pub machine: machine::Model,
}
impl Event for MachineDiscovered {
    const NAME: &'static str = "machine:discovered";
    fn topic_path(&self) -> String {
        topics::machines_topic()
    }
}

/// Presence and runtime snapshot after a heartbeat or ping sweep. Goes on
/// the global topic so the fleet list can update without per-machine
/// subscriptions.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStateChanged {
    pub machine_id: String,
    pub presence: Presence,
    pub status_text: String,
    pub active_window: Option<String>,
    pub ping_latency_ms: Option<i64>,
}
impl Event for MachineStateChanged {
    const NAME: &'static str = "machine:state";
    fn topic_path(&self) -> String {
        topics::machines_topic()
    }
}

/* ---------- per-machine detail feeds ---------- */

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityUpdate {
    pub machine_id: String,
    pub session: activity_session::Model,
}
impl Event for ActivityUpdate {
    const NAME: &'static str = "activity:update";
    fn topic_path(&self) -> String {
        topics::machine_topic(&self.machine_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditAlert {
    pub machine_id: String,
    pub event: audit_event::Model,
}
impl Event for AuditAlert {
    const NAME: &'static str = "audit:alert";
    fn topic_path(&self) -> String {
        topics::machine_topic(&self.machine_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditGlobal {
    pub machine_id: String,
    pub machine_name: String,
    pub event: audit_event::Model,
}
impl Event for AuditGlobal {
    const NAME: &'static str = "audit:global";
    fn topic_path(&self) -> String {
        topics::security_topic()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotNew {
    pub machine_id: String,
    pub screenshot: screenshot::Model,
}
impl Event for ScreenshotNew {
    const NAME: &'static str = "screenshot:new";
    fn topic_path(&self) -> String {
        topics::machine_topic(&self.machine_id)
    }
}

/* ---------- server-to-agent pushes ---------- */

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCommand {
    pub machine_id: String,
    #[serde(rename = "type")]
    pub command: String,
    pub timestamp: DateTime<Utc>,
}
impl Event for ServerCommand {
    const NAME: &'static str = "server:command";
    fn topic_path(&self) -> String {
        topics::agent_topic(&self.machine_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub machine_id: String,
    pub settings: MachineSettings,
}
impl Event for SettingsUpdate {
    const NAME: &'static str = "server:settings_update";
    fn topic_path(&self) -> String {
        topics::agent_topic(&self.machine_id)
    }
}
