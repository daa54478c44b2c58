//! In-process [`Store`] used by unit tests.
//!
//! Mirrors the SeaORM implementation's semantics (idempotent registration,
//! field-level merges, audit dedup) over plain maps so the router and
//! aggregator can be exercised without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::models::{
    activity_heartbeat, activity_session, audit_event, machine, machine_state, screenshot,
};
use crate::settings::MachineSettings;
use crate::store::{
    HeartbeatRecord, MachineRegistration, NewAuditEvent, NewScreenshot, PingObservation,
    RuntimePatch, Store,
};

#[derive(Default)]
struct Inner {
    machines: HashMap<String, machine::Model>,
    states: HashMap<String, machine_state::Model>,
    heartbeats: Vec<activity_heartbeat::Model>,
    sessions: Vec<activity_session::Model>,
    audits: Vec<audit_event::Model>,
    screenshots: Vec<screenshot::Model>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn blank_state(machine_id: &str) -> machine_state::Model {
        machine_state::Model {
            machine_id: machine_id.to_string(),
            active_window: None,
            screenshot_count: 0,
            upload_count: 0,
            health_status: None,
            last_activity_time: None,
            agent_version: None,
            settings: None,
            applied_settings: None,
            ping_health: None,
            ping_latency_ms: None,
            last_ping_at: None,
            last_ping_success: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: seed a machine in a given status.
    pub async fn seed_machine(
        &self,
        id: &str,
        name: &str,
        api_key: &str,
        status: machine::MachineStatus,
    ) -> machine::Model {
        let now = Utc::now();
        let m = machine::Model {
            id: id.to_string(),
            name: name.to_string(),
            display_name: None,
            hostname: None,
            ip_address: None,
            api_key: api_key.to_string(),
            status,
            last_seen: None,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .lock()
            .await
            .machines
            .insert(id.to_string(), m.clone());
        m
    }

    pub async fn heartbeat_count(&self) -> usize {
        self.inner.lock().await.heartbeats.len()
    }

    pub async fn session_count(&self, machine_id: &str) -> usize {
        self.inner
            .lock()
            .await
            .sessions
            .iter()
            .filter(|s| s.machine_id == machine_id)
            .count()
    }

    pub async fn audit_count(&self, machine_id: &str) -> usize {
        self.inner
            .lock()
            .await
            .audits
            .iter()
            .filter(|a| a.machine_id == machine_id)
            .count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn machine_by_id(&self, id: &str) -> Result<Option<machine::Model>, DbErr> {
        Ok(self.inner.lock().await.machines.get(id).cloned())
    }

    async fn machine_by_name(&self, name: &str) -> Result<Option<machine::Model>, DbErr> {
        Ok(self
            .inner
            .lock()
            .await
            .machines
            .values()
            .find(|m| m.name == name)
            .cloned())
    }

    async fn register_machine(
        &self,
        reg: MachineRegistration,
    ) -> Result<(machine::Model, bool), DbErr> {
        let mut inner = self.inner.lock().await;
        if let Some(id) = &reg.id {
            if let Some(m) = inner.machines.get(id) {
                return Ok((m.clone(), false));
            }
        }
        if let Some(m) = inner.machines.values().find(|m| m.name == reg.name) {
            return Ok((m.clone(), false));
        }

        let now = Utc::now();
        let m = machine::Model {
            id: reg.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: reg.name,
            display_name: reg.display_name,
            hostname: reg.hostname,
            ip_address: reg.ip_address,
            api_key: reg.api_key,
            status: machine::MachineStatus::Pending,
            last_seen: None,
            created_at: now,
            updated_at: now,
        };
        inner.machines.insert(m.id.clone(), m.clone());
        Ok((m, true))
    }

    async fn touch_last_seen(
        &self,
        id: &str,
        at: DateTime<Utc>,
        source_ip: Option<String>,
    ) -> Result<(), DbErr> {
        let mut inner = self.inner.lock().await;
        if let Some(m) = inner.machines.get_mut(id) {
            m.last_seen = Some(at);
            if let Some(ip) = source_ip {
                m.ip_address = Some(ip);
            }
            m.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn stale_machines(&self, cutoff: DateTime<Utc>) -> Result<Vec<machine::Model>, DbErr> {
        Ok(self
            .inner
            .lock()
            .await
            .machines
            .values()
            .filter(|m| !m.is_archived())
            .filter(|m| m.last_seen.is_none_or(|seen| seen < cutoff))
            .cloned()
            .collect())
    }

    async fn list_machines(
        &self,
    ) -> Result<Vec<(machine::Model, Option<machine_state::Model>)>, DbErr> {
        let inner = self.inner.lock().await;
        let mut out: Vec<_> = inner
            .machines
            .values()
            .map(|m| (m.clone(), inner.states.get(&m.id).cloned()))
            .collect();
        out.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        Ok(out)
    }

    async fn machine_state(
        &self,
        machine_id: &str,
    ) -> Result<Option<machine_state::Model>, DbErr> {
        Ok(self.inner.lock().await.states.get(machine_id).cloned())
    }

    async fn merge_runtime_state(
        &self,
        machine_id: &str,
        patch: RuntimePatch,
    ) -> Result<machine_state::Model, DbErr> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .states
            .entry(machine_id.to_string())
            .or_insert_with(|| Inner::blank_state(machine_id));
        if let Some(w) = patch.active_window {
            state.active_window = Some(w);
        }
        if let Some(c) = patch.screenshot_count {
            state.screenshot_count = c;
        }
        if let Some(c) = patch.upload_count {
            state.upload_count = c;
        }
        if let Some(h) = patch.health_status {
            state.health_status = Some(h);
        }
        if let Some(t) = patch.last_activity_time {
            state.last_activity_time = Some(t);
        }
        if let Some(v) = patch.agent_version {
            state.agent_version = Some(v);
        }
        state.updated_at = Utc::now();
        Ok(state.clone())
    }

    async fn record_ping_health(
        &self,
        machine_id: &str,
        obs: PingObservation,
    ) -> Result<machine_state::Model, DbErr> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .states
            .entry(machine_id.to_string())
            .or_insert_with(|| Inner::blank_state(machine_id));
        state.last_ping_at = Some(obs.observed_at);
        if obs.alive {
            state.ping_health = Some("reachable".into());
            state.ping_latency_ms = obs.latency_ms;
            state.last_ping_success = Some(obs.observed_at);
        } else {
            state.ping_health = Some("unreachable".into());
            state.ping_latency_ms = None;
        }
        state.updated_at = Utc::now();
        Ok(state.clone())
    }

    async fn update_settings(
        &self,
        machine_id: &str,
        settings: &MachineSettings,
    ) -> Result<machine_state::Model, DbErr> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .states
            .entry(machine_id.to_string())
            .or_insert_with(|| Inner::blank_state(machine_id));
        state.settings = Some(settings.to_column());
        state.updated_at = Utc::now();
        Ok(state.clone())
    }

    async fn append_heartbeat(&self, hb: &HeartbeatRecord) -> Result<(), DbErr> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id();
        inner.heartbeats.push(activity_heartbeat::Model {
            id,
            machine_id: hb.machine_id.clone(),
            timestamp: hb.timestamp,
            active_window: hb.active_window.clone(),
            process_name: hb.process_name.clone(),
            username: hb.username.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn latest_session(
        &self,
        machine_id: &str,
    ) -> Result<Option<activity_session::Model>, DbErr> {
        Ok(self
            .inner
            .lock()
            .await
            .sessions
            .iter()
            .filter(|s| s.machine_id == machine_id)
            .max_by_key(|s| (s.end_time, s.id))
            .cloned())
    }

    async fn start_session(
        &self,
        hb: &HeartbeatRecord,
    ) -> Result<activity_session::Model, DbErr> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id();
        let session = activity_session::Model {
            id,
            machine_id: hb.machine_id.clone(),
            start_time: hb.timestamp,
            end_time: hb.timestamp,
            duration_seconds: 0,
            process_name: hb.process_name.clone(),
            active_window: hb.active_window.clone(),
            username: hb.username.clone(),
            heartbeat_count: 1,
        };
        inner.sessions.push(session.clone());
        Ok(session)
    }

    async fn extend_session(
        &self,
        session_id: i64,
        end_time: i64,
    ) -> Result<activity_session::Model, DbErr> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| {
                DbErr::RecordNotFound(format!("activity session {session_id} vanished mid-extend"))
            })?;
        session.end_time = end_time;
        session.duration_seconds = end_time - session.start_time;
        session.heartbeat_count += 1;
        Ok(session.clone())
    }

    async fn sessions_since(
        &self,
        machine_id: &str,
        from_ts: i64,
    ) -> Result<Vec<activity_session::Model>, DbErr> {
        let inner = self.inner.lock().await;
        let mut out: Vec<_> = inner
            .sessions
            .iter()
            .filter(|s| s.machine_id == machine_id && s.end_time >= from_ts)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.start_time);
        Ok(out)
    }

    async fn insert_audit(
        &self,
        ev: NewAuditEvent,
    ) -> Result<Option<audit_event::Model>, DbErr> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner
            .audits
            .iter()
            .any(|a| a.machine_id == ev.machine_id && a.event_id == ev.event_id);
        if duplicate {
            return Ok(None);
        }
        let id = inner.next_id();
        let model = audit_event::Model {
            id,
            machine_id: ev.machine_id,
            event_id: ev.event_id,
            event_type: ev.event_type,
            username: ev.username,
            timestamp: ev.timestamp,
            details: ev.details,
            source_log_name: ev.source_log_name,
            is_flagged: ev.is_flagged,
            created_at: Utc::now(),
        };
        inner.audits.push(model.clone());
        Ok(Some(model))
    }

    async fn insert_screenshot(&self, s: NewScreenshot) -> Result<screenshot::Model, DbErr> {
        let mut inner = self.inner.lock().await;
        let model = screenshot::Model {
            id: s.id,
            machine_id: s.machine_id,
            capture_time: s.capture_time,
            trigger_type: s.trigger_type,
            google_drive_file_id: s.google_drive_file_id,
            is_uploaded: s.is_uploaded,
            created_at: Utc::now(),
        };
        inner.screenshots.push(model.clone());
        Ok(model)
    }
}
