//! Persistence seam for the presence/telemetry core.
//!
//! Everything the event router, aggregator and ping scheduler persist goes
//! through the [`Store`] trait: single-row writes with field-level patches,
//! so a heartbeat or probe result can never overwrite the settings columns.
//! [`SeaOrmStore`] is the production implementation; tests use
//! `crate::memory::MemoryStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder,
};

use crate::models::{
    activity_heartbeat, activity_session, audit_event, machine, machine_state, screenshot,
};
use crate::settings::MachineSettings;

/// Parameters for idempotent machine registration.
#[derive(Debug, Clone, Default)]
pub struct MachineRegistration {
    pub id: Option<String>,
    pub name: String,
    pub display_name: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub api_key: String,
}

/// Volatile fields an agent heartbeat may merge into `machine_states`.
/// Settings are not representable here on purpose.
#[derive(Debug, Clone, Default)]
pub struct RuntimePatch {
    pub active_window: Option<String>,
    pub screenshot_count: Option<i32>,
    pub upload_count: Option<i32>,
    pub health_status: Option<String>,
    pub last_activity_time: Option<i64>,
    pub agent_version: Option<String>,
}

/// Outcome of one ICMP probe, folded into the ping-health columns only.
#[derive(Debug, Clone, Copy)]
pub struct PingObservation {
    pub alive: bool,
    pub latency_ms: Option<i64>,
    pub observed_at: DateTime<Utc>,
}

/// One raw activity heartbeat as received from an agent.
#[derive(Debug, Clone)]
pub struct HeartbeatRecord {
    pub machine_id: String,
    pub timestamp: i64,
    pub active_window: String,
    pub process_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub machine_id: String,
    pub event_id: String,
    pub event_type: String,
    pub username: String,
    pub timestamp: i64,
    pub details: String,
    pub source_log_name: String,
    pub is_flagged: bool,
}

#[derive(Debug, Clone)]
pub struct NewScreenshot {
    pub id: String,
    pub machine_id: String,
    pub capture_time: i64,
    pub trigger_type: String,
    pub google_drive_file_id: Option<String>,
    pub is_uploaded: bool,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    // ----- machines -----
    async fn machine_by_id(&self, id: &str) -> Result<Option<machine::Model>, DbErr>;
    async fn machine_by_name(&self, name: &str) -> Result<Option<machine::Model>, DbErr>;
    /// Idempotent: resolves by id first, then by name; creates a pending
    /// machine only when neither matches.
    async fn register_machine(
        &self,
        reg: MachineRegistration,
    ) -> Result<(machine::Model, bool), DbErr>;
    /// Bumps `last_seen`, optionally recording the connection source IP.
    async fn touch_last_seen(
        &self,
        id: &str,
        at: DateTime<Utc>,
        source_ip: Option<String>,
    ) -> Result<(), DbErr>;
    /// Non-archived machines with `last_seen` null or older than `cutoff`.
    async fn stale_machines(&self, cutoff: DateTime<Utc>) -> Result<Vec<machine::Model>, DbErr>;
    async fn list_machines(
        &self,
    ) -> Result<Vec<(machine::Model, Option<machine_state::Model>)>, DbErr>;

    // ----- machine state -----
    async fn machine_state(&self, machine_id: &str)
    -> Result<Option<machine_state::Model>, DbErr>;
    /// Field-level upsert of the volatile runtime columns.
    async fn merge_runtime_state(
        &self,
        machine_id: &str,
        patch: RuntimePatch,
    ) -> Result<machine_state::Model, DbErr>;
    /// Field-level upsert of the ping-health columns. A dead probe updates
    /// `last_ping_at` but leaves `last_ping_success` alone: it is "no result
    /// this cycle", not "offline".
    async fn record_ping_health(
        &self,
        machine_id: &str,
        obs: PingObservation,
    ) -> Result<machine_state::Model, DbErr>;
    /// Stores a full settings document (already merged by the caller).
    async fn update_settings(
        &self,
        machine_id: &str,
        settings: &MachineSettings,
    ) -> Result<machine_state::Model, DbErr>;

    // ----- activity -----
    async fn append_heartbeat(&self, hb: &HeartbeatRecord) -> Result<(), DbErr>;
    /// Most-recently-ended session for the machine, i.e. the open one.
    async fn latest_session(
        &self,
        machine_id: &str,
    ) -> Result<Option<activity_session::Model>, DbErr>;
    async fn start_session(&self, hb: &HeartbeatRecord)
    -> Result<activity_session::Model, DbErr>;
    async fn extend_session(
        &self,
        session_id: i64,
        end_time: i64,
    ) -> Result<activity_session::Model, DbErr>;
    /// Sessions overlapping `[from_ts, ∞)` for the machine, oldest first.
    async fn sessions_since(
        &self,
        machine_id: &str,
        from_ts: i64,
    ) -> Result<Vec<activity_session::Model>, DbErr>;

    // ----- audit & screenshots -----
    /// Inserts unless `(machine_id, event_id)` was already stored; returns
    /// `None` for the duplicate case.
    async fn insert_audit(
        &self,
        ev: NewAuditEvent,
    ) -> Result<Option<audit_event::Model>, DbErr>;
    async fn insert_screenshot(&self, s: NewScreenshot) -> Result<screenshot::Model, DbErr>;
}

/// SeaORM-backed store used by the running service.
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn state_or_default(
        &self,
        machine_id: &str,
    ) -> Result<machine_state::ActiveModel, DbErr> {
        let existing = machine_state::Entity::find_by_id(machine_id.to_string())
            .one(&self.db)
            .await?;
        Ok(match existing {
            Some(m) => m.into(),
            None => machine_state::ActiveModel {
                machine_id: Set(machine_id.to_string()),
                screenshot_count: Set(0),
                upload_count: Set(0),
                updated_at: Set(Utc::now()),
                ..Default::default()
            },
        })
    }

    async fn save_state(
        &self,
        am: machine_state::ActiveModel,
        existed: bool,
    ) -> Result<machine_state::Model, DbErr> {
        if existed {
            am.update(&self.db).await
        } else {
            am.insert(&self.db).await
        }
    }
}

#[async_trait]
impl Store for SeaOrmStore {
    async fn machine_by_id(&self, id: &str) -> Result<Option<machine::Model>, DbErr> {
        machine::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
    }

    async fn machine_by_name(&self, name: &str) -> Result<Option<machine::Model>, DbErr> {
        machine::Entity::find()
            .filter(machine::Column::Name.eq(name))
            .one(&self.db)
            .await
    }

    async fn register_machine(
        &self,
        reg: MachineRegistration,
    ) -> Result<(machine::Model, bool), DbErr> {
        if let Some(id) = &reg.id {
            if let Some(existing) = self.machine_by_id(id).await? {
                return Ok((existing, false));
            }
        }
        if let Some(existing) = self.machine_by_name(&reg.name).await? {
            return Ok((existing, false));
        }

        let now = Utc::now();
        let created = machine::ActiveModel {
            id: Set(reg.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
            name: Set(reg.name),
            display_name: Set(reg.display_name),
            hostname: Set(reg.hostname),
            ip_address: Set(reg.ip_address),
            api_key: Set(reg.api_key),
            status: Set(machine::MachineStatus::Pending),
            last_seen: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;
        Ok((created, true))
    }

    async fn touch_last_seen(
        &self,
        id: &str,
        at: DateTime<Utc>,
        source_ip: Option<String>,
    ) -> Result<(), DbErr> {
        let Some(m) = self.machine_by_id(id).await? else {
            return Ok(());
        };
        let mut am: machine::ActiveModel = m.into();
        am.last_seen = Set(Some(at));
        if let Some(ip) = source_ip {
            am.ip_address = Set(Some(ip));
        }
        am.updated_at = Set(Utc::now());
        am.update(&self.db).await?;
        Ok(())
    }

    async fn stale_machines(&self, cutoff: DateTime<Utc>) -> Result<Vec<machine::Model>, DbErr> {
        machine::Entity::find()
            .filter(machine::Column::Status.ne(machine::MachineStatus::Archived))
            .filter(
                Condition::any()
                    .add(machine::Column::LastSeen.is_null())
                    .add(machine::Column::LastSeen.lt(cutoff)),
            )
            .all(&self.db)
            .await
    }

    async fn list_machines(
        &self,
    ) -> Result<Vec<(machine::Model, Option<machine_state::Model>)>, DbErr> {
        machine::Entity::find()
            .find_also_related(machine_state::Entity)
            .order_by_asc(machine::Column::Name)
            .all(&self.db)
            .await
    }

    async fn machine_state(
        &self,
        machine_id: &str,
    ) -> Result<Option<machine_state::Model>, DbErr> {
        machine_state::Entity::find_by_id(machine_id.to_string())
            .one(&self.db)
            .await
    }

    async fn merge_runtime_state(
        &self,
        machine_id: &str,
        patch: RuntimePatch,
    ) -> Result<machine_state::Model, DbErr> {
        let existed = self.machine_state(machine_id).await?.is_some();
        let mut am = self.state_or_default(machine_id).await?;
        if let Some(w) = patch.active_window {
            am.active_window = Set(Some(w));
        }
        if let Some(c) = patch.screenshot_count {
            am.screenshot_count = Set(c);
        }
        if let Some(c) = patch.upload_count {
            am.upload_count = Set(c);
        }
        if let Some(h) = patch.health_status {
            am.health_status = Set(Some(h));
        }
        if let Some(t) = patch.last_activity_time {
            am.last_activity_time = Set(Some(t));
        }
        if let Some(v) = patch.agent_version {
            am.agent_version = Set(Some(v));
        }
        am.updated_at = Set(Utc::now());
        self.save_state(am, existed).await
    }

    async fn record_ping_health(
        &self,
        machine_id: &str,
        obs: PingObservation,
    ) -> Result<machine_state::Model, DbErr> {
        let existed = self.machine_state(machine_id).await?.is_some();
        let mut am = self.state_or_default(machine_id).await?;
        am.last_ping_at = Set(Some(obs.observed_at));
        if obs.alive {
            am.ping_health = Set(Some("reachable".into()));
            am.ping_latency_ms = Set(obs.latency_ms);
            am.last_ping_success = Set(Some(obs.observed_at));
        } else {
            am.ping_health = Set(Some("unreachable".into()));
            am.ping_latency_ms = Set(None);
        }
        am.updated_at = Set(Utc::now());
        self.save_state(am, existed).await
    }

    async fn update_settings(
        &self,
        machine_id: &str,
        settings: &MachineSettings,
    ) -> Result<machine_state::Model, DbErr> {
        let existed = self.machine_state(machine_id).await?.is_some();
        let mut am = self.state_or_default(machine_id).await?;
        am.settings = Set(Some(settings.to_column()));
        am.updated_at = Set(Utc::now());
        self.save_state(am, existed).await
    }

    async fn append_heartbeat(&self, hb: &HeartbeatRecord) -> Result<(), DbErr> {
        activity_heartbeat::ActiveModel {
            machine_id: Set(hb.machine_id.clone()),
            timestamp: Set(hb.timestamp),
            active_window: Set(hb.active_window.clone()),
            process_name: Set(hb.process_name.clone()),
            username: Set(hb.username.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn latest_session(
        &self,
        machine_id: &str,
    ) -> Result<Option<activity_session::Model>, DbErr> {
        activity_session::Entity::find()
            .filter(activity_session::Column::MachineId.eq(machine_id))
            .order_by_desc(activity_session::Column::EndTime)
            .order_by_desc(activity_session::Column::Id)
            .one(&self.db)
            .await
    }

    async fn start_session(
        &self,
        hb: &HeartbeatRecord,
    ) -> Result<activity_session::Model, DbErr> {
        activity_session::ActiveModel {
            machine_id: Set(hb.machine_id.clone()),
            start_time: Set(hb.timestamp),
            end_time: Set(hb.timestamp),
            duration_seconds: Set(0),
            process_name: Set(hb.process_name.clone()),
            active_window: Set(hb.active_window.clone()),
            username: Set(hb.username.clone()),
            heartbeat_count: Set(1),
            ..Default::default()
        }
        .insert(&self.db)
        .await
    }

    async fn extend_session(
        &self,
        session_id: i64,
        end_time: i64,
    ) -> Result<activity_session::Model, DbErr> {
        let Some(session) = activity_session::Entity::find_by_id(session_id)
            .one(&self.db)
            .await?
        else {
            return Err(DbErr::RecordNotFound(format!(
                "activity session {session_id} vanished mid-extend"
            )));
        };
        let start = session.start_time;
        let count = session.heartbeat_count;
        let mut am: activity_session::ActiveModel = session.into();
        am.end_time = Set(end_time);
        am.duration_seconds = Set(end_time - start);
        am.heartbeat_count = Set(count + 1);
        am.update(&self.db).await
    }

    async fn sessions_since(
        &self,
        machine_id: &str,
        from_ts: i64,
    ) -> Result<Vec<activity_session::Model>, DbErr> {
        activity_session::Entity::find()
            .filter(activity_session::Column::MachineId.eq(machine_id))
            .filter(activity_session::Column::EndTime.gte(from_ts))
            .order_by_asc(activity_session::Column::StartTime)
            .all(&self.db)
            .await
    }

    async fn insert_audit(
        &self,
        ev: NewAuditEvent,
    ) -> Result<Option<audit_event::Model>, DbErr> {
        let duplicate = audit_event::Entity::find()
            .filter(audit_event::Column::MachineId.eq(&ev.machine_id))
            .filter(audit_event::Column::EventId.eq(&ev.event_id))
            .one(&self.db)
            .await?;
        if duplicate.is_some() {
            return Ok(None);
        }

        let inserted = audit_event::ActiveModel {
            machine_id: Set(ev.machine_id),
            event_id: Set(ev.event_id),
            event_type: Set(ev.event_type),
            username: Set(ev.username),
            timestamp: Set(ev.timestamp),
            details: Set(ev.details),
            source_log_name: Set(ev.source_log_name),
            is_flagged: Set(ev.is_flagged),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await;

        match inserted {
            Ok(model) => Ok(Some(model)),
            // Lost a race against an identical replay; the unique index on
            // (machine_id, event_id) makes this a duplicate, not an error.
            Err(DbErr::Exec(e)) if e.to_string().contains("UNIQUE") => {
                tracing::debug!("audit replay raced unique index: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn insert_screenshot(&self, s: NewScreenshot) -> Result<screenshot::Model, DbErr> {
        screenshot::ActiveModel {
            id: Set(s.id),
            machine_id: Set(s.machine_id),
            capture_time: Set(s.capture_time),
            trigger_type: Set(s.trigger_type),
            google_drive_file_id: Set(s.google_drive_file_id),
            is_uploaded: Set(s.is_uploaded),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await
    }
}
