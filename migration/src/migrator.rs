use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202601100001_create_machines::Migration),
            Box::new(migrations::m202601100002_create_machine_states::Migration),
            Box::new(migrations::m202601100003_create_activity_heartbeats::Migration),
            Box::new(migrations::m202601100004_create_activity_sessions::Migration),
            Box::new(migrations::m202601100005_create_audit_events::Migration),
            Box::new(migrations::m202601100006_create_screenshots::Migration),
        ]
    }
}
