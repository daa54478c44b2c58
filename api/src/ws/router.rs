//! The event router: every agent frame and dashboard request funnels
//! through here.
//!
//! The router owns the connection registry and is constructed exactly once
//! in `main`; socket tasks and REST handlers share it through `AppState`.
//! Frames from archived machines are acknowledged at the transport level
//! but rejected here before any persistence or broadcast.

use chrono::{DateTime, Utc};
use db::models::{audit_event, machine, machine_state, screenshot};
use db::settings::{MachineSettings, SettingsPatch};
use db::store::{
    MachineRegistration, NewAuditEvent, NewScreenshot, RuntimePatch, Store,
};
use sea_orm::DbErr;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use util::ws::Broadcaster;

use super::events::{
    self, ActivityUpdate, AuditAlert, AuditGlobal, MachineDiscovered, MachineOffline,
    MachineOnline, MachineStateChanged, ScreenshotNew, ServerCommand, SettingsUpdate,
};
use super::types::{ActivityFrame, AuditFrame, ConnectFrame, HeartbeatFrame, ScreenshotFrame};
use crate::activity::{ActivityAggregator, ActivityIngest, SessionMutation};
use crate::auth::CredentialValidator;
use crate::presence::{self, PingHealth, Presence};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid machine credentials")]
    InvalidCredentials,
    #[error("unknown machine {0}")]
    UnknownMachine(String),
    #[error("machine {0} is archived")]
    ArchivedMachine(String),
    #[error(transparent)]
    Db(#[from] DbErr),
}

/// Result of a connect frame. `Archived` is acknowledged by the socket
/// layer with a terminal frame instead of joining the registry.
#[derive(Debug)]
pub enum ConnectOutcome {
    Accepted { machine: machine::Model, conn_id: u64 },
    Archived,
}

struct MachineConnection {
    conn_id: u64,
    connected_at: DateTime<Utc>,
}

/// One machine row as the dashboard sees it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSummary {
    pub machine_id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub status: machine::MachineStatus,
    pub presence: Presence,
    pub status_text: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub active_window: Option<String>,
    pub ping_latency_ms: Option<i64>,
}

pub struct EventRouter {
    ws: Broadcaster,
    store: Arc<dyn Store>,
    validator: Arc<dyn CredentialValidator>,
    aggregator: ActivityAggregator,
    heartbeat_interval_seconds: i64,
    connections: RwLock<HashMap<String, MachineConnection>>,
    next_conn_id: AtomicU64,
}

impl EventRouter {
    pub fn new(
        ws: Broadcaster,
        store: Arc<dyn Store>,
        validator: Arc<dyn CredentialValidator>,
        heartbeat_interval_seconds: i64,
    ) -> Self {
        Self {
            ws,
            aggregator: ActivityAggregator::new(Arc::clone(&store)),
            store,
            validator,
            heartbeat_interval_seconds,
            connections: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn presence_for(
        &self,
        last_seen: Option<DateTime<Utc>>,
        state: Option<&machine_state::Model>,
    ) -> (Presence, String) {
        let now = Utc::now();
        let ping_health = state.and_then(|s| PingHealth::from_column(s.ping_health.as_deref()));
        let p = presence::resolve(last_seen, now, self.heartbeat_interval_seconds, ping_health);
        let text = presence::format_status(
            p.status,
            last_seen,
            state.and_then(|s| s.last_ping_success),
            now,
        );
        (p, text)
    }

    /* ---------- agent frames ---------- */

    pub async fn connect(
        &self,
        frame: &ConnectFrame,
        source_ip: Option<String>,
    ) -> Result<ConnectOutcome, RouterError> {
        let machine = self
            .validator
            .verify(&frame.machine_id, &frame.api_key)
            .await?
            .ok_or(RouterError::InvalidCredentials)?;
        if machine.is_archived() {
            tracing::info!("archived machine {} tried to connect", machine.id);
            return Ok(ConnectOutcome::Archived);
        }

        let now = Utc::now();
        self.store
            .touch_last_seen(&machine.id, now, source_ip)
            .await?;
        if frame.version.is_some() {
            self.store
                .merge_runtime_state(
                    &machine.id,
                    RuntimePatch {
                        agent_version: frame.version.clone(),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.connections.write().await.insert(
            machine.id.clone(),
            MachineConnection {
                conn_id,
                connected_at: now,
            },
        );

        // Reconnect overlap: the fleet already shows this machine online.
        // Lifecycle records carry no presence blob; classification always
        // comes from machine:state via the shared resolver.
        if previous.is_none() {
            events::emit(
                &self.ws,
                &MachineOnline {
                    machine_id: machine.id.clone(),
                    name: machine.name.clone(),
                    timestamp: now,
                },
            )
            .await;
        }
        Ok(ConnectOutcome::Accepted { machine, conn_id })
    }

    /// `conn_id` guards against a stale socket tearing down a newer
    /// connection for the same machine.
    pub async fn disconnect(&self, machine_id: &str, conn_id: u64) {
        let removed = {
            let mut conns = self.connections.write().await;
            match conns.get(machine_id) {
                Some(c) if c.conn_id == conn_id => conns.remove(machine_id),
                _ => None,
            }
        };
        let Some(conn) = removed else {
            return;
        };
        tracing::info!(
            "machine {machine_id} disconnected after {}s",
            (Utc::now() - conn.connected_at).num_seconds()
        );

        let name = match self.store.machine_by_id(machine_id).await {
            Ok(Some(m)) => m.name,
            _ => machine_id.to_string(),
        };
        events::emit(
            &self.ws,
            &MachineOffline {
                machine_id: machine_id.to_string(),
                name,
                timestamp: Utc::now(),
            },
        )
        .await;
    }

    pub async fn heartbeat(
        &self,
        frame: HeartbeatFrame,
    ) -> Result<Option<machine_state::Model>, RouterError> {
        let Some(machine) = self.store.machine_by_id(&frame.machine_id).await? else {
            return Err(RouterError::UnknownMachine(frame.machine_id));
        };
        if machine.is_archived() {
            tracing::debug!("dropping heartbeat from archived machine {}", machine.id);
            return Ok(None);
        }

        let now = Utc::now();
        let r = frame.state;
        let state = self
            .store
            .merge_runtime_state(
                &machine.id,
                RuntimePatch {
                    active_window: r.active_window,
                    screenshot_count: r.screenshot_count,
                    upload_count: r.upload_count,
                    health_status: r.health,
                    last_activity_time: r.last_activity_time,
                    agent_version: r.version,
                },
            )
            .await?;
        self.store.touch_last_seen(&machine.id, now, None).await?;

        let (p, text) = self.presence_for(Some(now), Some(&state));
        events::emit(
            &self.ws,
            &MachineStateChanged {
                machine_id: machine.id,
                presence: p,
                status_text: text,
                active_window: state.active_window.clone(),
                ping_latency_ms: state.ping_latency_ms,
            },
        )
        .await;
        Ok(Some(state))
    }

    pub async fn activity(
        &self,
        frame: ActivityFrame,
    ) -> Result<Option<SessionMutation>, RouterError> {
        let Some(machine) = self.store.machine_by_id(&frame.machine_id).await? else {
            return Err(RouterError::UnknownMachine(frame.machine_id));
        };
        if machine.is_archived() {
            return Ok(None);
        }

        let a = frame.activity;
        let mutation = self
            .aggregator
            .ingest(ActivityIngest {
                machine_id: machine.id.clone(),
                timestamp: a.timestamp,
                active_window: a.active_window,
                process_name: a.process_name,
                username: a.username,
                ping_interval_seconds: self.heartbeat_interval_seconds,
            })
            .await?;

        let session = match &mutation {
            SessionMutation::Started(s) | SessionMutation::Extended(s) => s.clone(),
            SessionMutation::OutOfOrder => return Ok(Some(mutation)),
        };
        events::emit(
            &self.ws,
            &ActivityUpdate {
                machine_id: machine.id,
                session,
            },
        )
        .await;
        Ok(Some(mutation))
    }

    /// Replayed events (same agent-assigned id) are deduplicated; only the
    /// first copy is persisted and broadcast.
    pub async fn audit(
        &self,
        frame: AuditFrame,
    ) -> Result<Option<audit_event::Model>, RouterError> {
        let Some(machine) = self.store.machine_by_id(&frame.machine_id).await? else {
            return Err(RouterError::UnknownMachine(frame.machine_id));
        };
        if machine.is_archived() {
            return Ok(None);
        }

        let e = frame.event;
        let Some(stored) = self
            .store
            .insert_audit(NewAuditEvent {
                machine_id: machine.id.clone(),
                event_id: e.event_id,
                event_type: e.event_type,
                username: e.username,
                timestamp: e.timestamp,
                details: e.details.to_string(),
                source_log_name: e.source_log_name,
                is_flagged: e.is_flagged,
            })
            .await?
        else {
            return Ok(None);
        };

        events::emit(
            &self.ws,
            &AuditAlert {
                machine_id: machine.id.clone(),
                event: stored.clone(),
            },
        )
        .await;
        events::emit(
            &self.ws,
            &AuditGlobal {
                machine_id: machine.id,
                machine_name: machine.name,
                event: stored.clone(),
            },
        )
        .await;
        Ok(Some(stored))
    }

    pub async fn screenshot(
        &self,
        frame: ScreenshotFrame,
    ) -> Result<Option<screenshot::Model>, RouterError> {
        let Some(machine) = self.store.machine_by_id(&frame.machine_id).await? else {
            return Err(RouterError::UnknownMachine(frame.machine_id));
        };
        if machine.is_archived() {
            return Ok(None);
        }

        let s = frame.screenshot;
        let stored = self
            .store
            .insert_screenshot(NewScreenshot {
                id: s.id,
                machine_id: machine.id.clone(),
                capture_time: s.capture_time,
                trigger_type: s.trigger_type,
                google_drive_file_id: s.google_drive_file_id,
                is_uploaded: s.is_uploaded,
            })
            .await?;
        events::emit(
            &self.ws,
            &ScreenshotNew {
                machine_id: machine.id,
                screenshot: stored.clone(),
            },
        )
        .await;
        Ok(Some(stored))
    }

    /* ---------- dashboard / REST surface ---------- */

    /// Fleet snapshot with presence resolved at call time.
    pub async fn snapshot(&self) -> Result<Vec<MachineSummary>, DbErr> {
        let rows = self.store.list_machines().await?;
        Ok(rows
            .into_iter()
            .map(|(m, state)| {
                let (p, text) = self.presence_for(m.last_seen, state.as_ref());
                MachineSummary {
                    machine_id: m.id,
                    name: m.name,
                    display_name: m.display_name,
                    status: m.status,
                    presence: p,
                    status_text: text,
                    last_seen: m.last_seen,
                    active_window: state.as_ref().and_then(|s| s.active_window.clone()),
                    ping_latency_ms: state.as_ref().and_then(|s| s.ping_latency_ms),
                }
            })
            .collect())
    }

    pub async fn status(&self, machine_id: &str) -> Result<MachineSummary, RouterError> {
        let Some(m) = self.store.machine_by_id(machine_id).await? else {
            return Err(RouterError::UnknownMachine(machine_id.to_string()));
        };
        let state = self.store.machine_state(machine_id).await?;
        let (p, text) = self.presence_for(m.last_seen, state.as_ref());
        Ok(MachineSummary {
            machine_id: m.id,
            name: m.name,
            display_name: m.display_name,
            status: m.status,
            presence: p,
            status_text: text,
            last_seen: m.last_seen,
            active_window: state.as_ref().and_then(|s| s.active_window.clone()),
            ping_latency_ms: state.as_ref().and_then(|s| s.ping_latency_ms),
        })
    }

    pub async fn register(
        &self,
        reg: MachineRegistration,
    ) -> Result<(machine::Model, bool), RouterError> {
        let (machine, created) = self.store.register_machine(reg).await?;
        if created {
            tracing::info!("discovered new machine {} ({})", machine.name, machine.id);
            events::emit(
                &self.ws,
                &MachineDiscovered {
                    machine: machine.clone(),
                },
            )
            .await;
        }
        Ok((machine, created))
    }

    pub async fn send_command(&self, machine_id: &str, command: &str) -> Result<(), RouterError> {
        let Some(machine) = self.store.machine_by_id(machine_id).await? else {
            return Err(RouterError::UnknownMachine(machine_id.to_string()));
        };
        if machine.is_archived() {
            return Err(RouterError::ArchivedMachine(machine_id.to_string()));
        }
        events::emit(
            &self.ws,
            &ServerCommand {
                machine_id: machine.id,
                command: command.to_string(),
                timestamp: Utc::now(),
            },
        )
        .await;
        Ok(())
    }

    /// Merges a settings patch onto the stored document and pushes the
    /// result to the agent's topic. Returns the merged document.
    pub async fn push_settings(
        &self,
        machine_id: &str,
        patch: &SettingsPatch,
    ) -> Result<MachineSettings, RouterError> {
        let Some(machine) = self.store.machine_by_id(machine_id).await? else {
            return Err(RouterError::UnknownMachine(machine_id.to_string()));
        };
        if machine.is_archived() {
            return Err(RouterError::ArchivedMachine(machine_id.to_string()));
        }

        let state = self.store.machine_state(machine_id).await?;
        let base = MachineSettings::from_column(state.as_ref().and_then(|s| s.settings.as_ref()));
        let merged = base.merge(patch);
        self.store.update_settings(machine_id, &merged).await?;
        events::emit(
            &self.ws,
            &SettingsUpdate {
                machine_id: machine.id,
                settings: merged.clone(),
            },
        )
        .await;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKeyValidator;
    use crate::presence::ConnectionStatus;
    use db::memory::MemoryStore;
    use db::models::machine::MachineStatus;
    use crate::ws::types::{ActivityReport, AuditReport, RuntimeReport};

    const INTERVAL: i64 = 60;

    async fn router_with(
        status: MachineStatus,
    ) -> (Arc<EventRouter>, Arc<MemoryStore>, Broadcaster) {
        let store = Arc::new(MemoryStore::new());
        store.seed_machine("m1", "LAB-PC-01", "secret", status).await;
        let ws = Broadcaster::new();
        let validator = Arc::new(ApiKeyValidator::new(store.clone() as Arc<dyn Store>));
        let router = Arc::new(EventRouter::new(
            ws.clone(),
            store.clone() as Arc<dyn Store>,
            validator,
            INTERVAL,
        ));
        (router, store, ws)
    }

    fn connect_frame() -> ConnectFrame {
        ConnectFrame {
            machine_id: "m1".into(),
            api_key: "secret".into(),
            version: None,
        }
    }

    #[tokio::test]
    async fn connect_touches_last_seen_and_broadcasts_online() {
        let (router, store, ws) = router_with(MachineStatus::Active).await;
        let mut rx = ws.subscribe("machines").await;

        let outcome = router.connect(&connect_frame(), Some("10.1.1.5".into())).await.unwrap();
        assert!(matches!(outcome, ConnectOutcome::Accepted { .. }));

        let m = store.machine_by_id("m1").await.unwrap().unwrap();
        assert!(m.last_seen.is_some());
        assert_eq!(m.ip_address.as_deref(), Some("10.1.1.5"));

        let raw = rx.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["event"], "machine:online");
        assert_eq!(v["payload"]["machineId"], "m1");
        assert!(v["payload"]["timestamp"].is_string());
        assert!(v["payload"].get("presence").is_none());
    }

    #[tokio::test]
    async fn connect_persists_the_reported_agent_version() {
        let (router, store, _ws) = router_with(MachineStatus::Active).await;
        let frame = ConnectFrame {
            version: Some("1.4.2".into()),
            ..connect_frame()
        };

        router.connect(&frame, None).await.unwrap();

        let state = store.machine_state("m1").await.unwrap().unwrap();
        assert_eq!(state.agent_version.as_deref(), Some("1.4.2"));
    }

    #[tokio::test]
    async fn bad_credentials_leave_no_trace() {
        let (router, store, _ws) = router_with(MachineStatus::Active).await;
        let frame = ConnectFrame {
            api_key: "wrong".into(),
            ..connect_frame()
        };

        let err = router.connect(&frame, None).await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidCredentials));
        let m = store.machine_by_id("m1").await.unwrap().unwrap();
        assert!(m.last_seen.is_none());
    }

    #[tokio::test]
    async fn archived_connect_is_acked_but_never_joined() {
        let (router, store, ws) = router_with(MachineStatus::Archived).await;
        let mut rx = ws.subscribe("machines").await;

        let outcome = router.connect(&connect_frame(), None).await.unwrap();
        assert!(matches!(outcome, ConnectOutcome::Archived));

        let m = store.machine_by_id("m1").await.unwrap().unwrap();
        assert!(m.last_seen.is_none());
        // nothing was broadcast for the rejected connect
        ws.broadcast("machines", "sentinel").await;
        assert_eq!(rx.recv().await.unwrap(), "sentinel");
    }

    #[tokio::test]
    async fn heartbeat_merges_state_and_rebroadcasts_presence() {
        let (router, _store, ws) = router_with(MachineStatus::Active).await;
        let mut rx = ws.subscribe("machines").await;

        let state = router
            .heartbeat(HeartbeatFrame {
                machine_id: "m1".into(),
                state: RuntimeReport {
                    active_window: Some("Terminal".into()),
                    screenshot_count: Some(2),
                    ..Default::default()
                },
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.active_window.as_deref(), Some("Terminal"));

        let raw = rx.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["event"], "machine:state");
        assert_eq!(v["payload"]["presence"]["isOnline"], true);
        assert_eq!(v["payload"]["activeWindow"], "Terminal");
    }

    #[tokio::test]
    async fn archived_heartbeat_mutates_nothing() {
        let (router, store, _ws) = router_with(MachineStatus::Archived).await;

        let out = router
            .heartbeat(HeartbeatFrame {
                machine_id: "m1".into(),
                state: RuntimeReport {
                    active_window: Some("Terminal".into()),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        assert!(out.is_none());
        assert!(store.machine_state("m1").await.unwrap().is_none());
        let m = store.machine_by_id("m1").await.unwrap().unwrap();
        assert!(m.last_seen.is_none());
    }

    #[tokio::test]
    async fn activity_lands_in_sessions_and_scoped_topic() {
        let (router, store, ws) = router_with(MachineStatus::Active).await;
        let mut rx = ws.subscribe("machines:m1").await;

        let out = router
            .activity(ActivityFrame {
                machine_id: "m1".into(),
                activity: ActivityReport {
                    timestamp: 1_700_000_000,
                    active_window: "main.rs".into(),
                    process_name: "code".into(),
                    username: Some("alice".into()),
                },
            })
            .await
            .unwrap();
        assert!(matches!(out, Some(SessionMutation::Started(_))));
        assert_eq!(store.session_count("m1").await, 1);

        let raw = rx.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["event"], "activity:update");
        assert_eq!(v["topic"], "machines:m1");
    }

    #[tokio::test]
    async fn duplicate_audit_event_broadcasts_once() {
        let (router, store, ws) = router_with(MachineStatus::Active).await;
        let mut scoped = ws.subscribe("machines:m1").await;
        let mut global = ws.subscribe("security").await;

        let frame = || AuditFrame {
            machine_id: "m1".into(),
            event: AuditReport {
                event_id: "evt-1".into(),
                event_type: "logon_failure".into(),
                username: "admin".into(),
                timestamp: 1_700_000_000,
                details: serde_json::json!({"attempts": 3}),
                source_log_name: "Security".into(),
                is_flagged: true,
            },
        };

        assert!(router.audit(frame()).await.unwrap().is_some());
        assert!(router.audit(frame()).await.unwrap().is_none());
        assert_eq!(store.audit_count("m1").await, 1);

        let v: serde_json::Value = serde_json::from_str(&scoped.recv().await.unwrap()).unwrap();
        assert_eq!(v["event"], "audit:alert");
        let v: serde_json::Value = serde_json::from_str(&global.recv().await.unwrap()).unwrap();
        assert_eq!(v["event"], "audit:global");
        assert_eq!(v["payload"]["machineName"], "LAB-PC-01");

        // no second copy on either feed
        ws.broadcast("machines:m1", "sentinel").await;
        assert_eq!(scoped.recv().await.unwrap(), "sentinel");
        ws.broadcast("security", "sentinel").await;
        assert_eq!(global.recv().await.unwrap(), "sentinel");
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_evict_a_newer_connection() {
        let (router, _store, ws) = router_with(MachineStatus::Active).await;

        let first = match router.connect(&connect_frame(), None).await.unwrap() {
            ConnectOutcome::Accepted { conn_id, .. } => conn_id,
            other => panic!("unexpected outcome: {other:?}"),
        };
        let _second = router.connect(&connect_frame(), None).await.unwrap();

        let mut rx = ws.subscribe("machines").await;
        router.disconnect("m1", first).await;

        // registry still holds the newer connection, so no offline event
        ws.broadcast("machines", "sentinel").await;
        assert_eq!(rx.recv().await.unwrap(), "sentinel");
        assert!(router.connections.read().await.contains_key("m1"));
    }

    #[tokio::test]
    async fn disconnect_broadcasts_offline() {
        let (router, _store, ws) = router_with(MachineStatus::Active).await;
        let conn_id = match router.connect(&connect_frame(), None).await.unwrap() {
            ConnectOutcome::Accepted { conn_id, .. } => conn_id,
            other => panic!("unexpected outcome: {other:?}"),
        };

        let mut rx = ws.subscribe("machines").await;
        router.disconnect("m1", conn_id).await;

        let v: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(v["event"], "machine:offline");
        assert_eq!(v["payload"]["machineId"], "m1");
        assert_eq!(v["payload"]["name"], "LAB-PC-01");
        assert!(v["payload"]["timestamp"].is_string());
        // presence classification travels on machine:state only; the
        // lifecycle record must not carry a competing snapshot
        assert!(v["payload"].get("presence").is_none());
    }

    #[tokio::test]
    async fn snapshot_resolves_presence_per_machine() {
        let (router, store, _ws) = router_with(MachineStatus::Active).await;
        store
            .seed_machine("m2", "LAB-PC-02", "k2", MachineStatus::Active)
            .await;
        store.touch_last_seen("m1", Utc::now(), None).await.unwrap();

        let rows = router.snapshot().await.unwrap();
        assert_eq!(rows.len(), 2);
        let m1 = rows.iter().find(|r| r.machine_id == "m1").unwrap();
        assert!(m1.presence.is_online);
        let m2 = rows.iter().find(|r| r.machine_id == "m2").unwrap();
        assert_eq!(m2.presence.status, ConnectionStatus::Offline);
        assert_eq!(m2.status_text, "Offline");
    }

    #[tokio::test]
    async fn settings_push_merges_and_notifies_agent_topic() {
        let (router, store, ws) = router_with(MachineStatus::Active).await;
        let mut rx = ws.subscribe("agent:m1").await;

        let patch = SettingsPatch {
            screenshot_interval_seconds: Some(120),
            ..Default::default()
        };
        let merged = router.push_settings("m1", &patch).await.unwrap();
        assert_eq!(merged.version, 2);
        assert_eq!(merged.screenshot_interval_seconds, Some(120));

        let state = store.machine_state("m1").await.unwrap().unwrap();
        assert_eq!(MachineSettings::from_column(state.settings.as_ref()), merged);

        let v: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(v["event"], "server:settings_update");
        assert_eq!(v["payload"]["settings"]["version"], 2);
    }

    #[tokio::test]
    async fn commands_to_archived_machines_are_refused() {
        let (router, _store, _ws) = router_with(MachineStatus::Archived).await;
        let err = router.send_command("m1", "lock").await.unwrap_err();
        assert!(matches!(err, RouterError::ArchivedMachine(_)));
    }
}
