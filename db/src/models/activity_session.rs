use sea_orm::entity::prelude::*;

/// A merged span of identical activity derived from heartbeats.
///
/// The most-recent session per machine (by `end_time`) is the open one;
/// everything older is immutable history. Closed sessions are time-ordered
/// and non-overlapping.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "activity_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub machine_id: String,
    /// Unix seconds.
    pub start_time: i64,
    /// Unix seconds; equals `start_time` for a fresh single-beat session.
    pub end_time: i64,
    pub duration_seconds: i64,
    pub process_name: String,
    pub active_window: String,
    pub username: Option<String>,
    pub heartbeat_count: i32,
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
