use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// Raw, append-only activity report. Authoritative input for session
/// aggregation; pruned by the external retention job, never updated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "activity_heartbeats")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub machine_id: String,
    /// Unix seconds as reported by the agent.
    pub timestamp: i64,
    pub active_window: String,
    pub process_name: String,
    pub username: Option<String>,
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
