use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// Security/audit record forwarded by an agent. `(machine_id, event_id)`
/// is unique so replays are idempotent.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "audit_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub machine_id: String,
    pub event_id: String,
    pub event_type: String,
    pub username: String,
    /// Unix seconds at the source log.
    pub timestamp: i64,
    pub details: String,
    pub source_log_name: String,
    pub is_flagged: bool,
    pub created_at: DateTime<Utc>,
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
