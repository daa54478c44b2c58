use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// Volatile per-machine snapshot, 1:1 with `machines`.
///
/// `settings` and `applied_settings` are desired-state blobs owned by the
/// configuration surface; heartbeat and ping writers update their own
/// columns and structurally cannot reach these two.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "machine_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub machine_id: String,
    pub active_window: Option<String>,
    pub screenshot_count: i32,
    pub upload_count: i32,
    pub health_status: Option<String>,
    pub last_activity_time: Option<i64>,
    pub agent_version: Option<String>,
    pub settings: Option<Json>,
    pub applied_settings: Option<Json>,
    pub ping_health: Option<String>,
    pub ping_latency_ms: Option<i64>,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub last_ping_success: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::machine::Entity",
        from = "Column::MachineId",
        to = "super::machine::Column::Id"
    )]
    Machine,
}

impl Related<super::machine::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Machine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
