use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// Durable machine identity. `last_seen` is touched only by connect and
/// heartbeat; archived machines keep their history but are rejected by the
/// event router before any mutation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "machines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub status: MachineStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, serde::Serialize, serde::Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "archived")]
    Archived,
}

impl Model {
    pub fn is_archived(&self) -> bool {
        self.status == MachineStatus::Archived
    }

    /// Probe target preference: explicit address first, hostname as fallback.
    pub fn probe_target(&self) -> Option<&str> {
        self.ip_address
            .as_deref()
            .or(self.hostname.as_deref())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::machine_state::Entity")]
    State,
    #[sea_orm(has_many = "super::activity_heartbeat::Entity")]
    Heartbeats,
    #[sea_orm(has_many = "super::activity_session::Entity")]
    Sessions,
    #[sea_orm(has_many = "super::audit_event::Entity")]
    AuditEvents,
    #[sea_orm(has_many = "super::screenshot::Entity")]
    Screenshots,
}

impl Related<super::machine_state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::State.def()
    }
}

impl Related<super::activity_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
