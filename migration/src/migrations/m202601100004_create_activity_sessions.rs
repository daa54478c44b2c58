use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202601100004_create_activity_sessions"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("activity_sessions"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("machine_id")).string().not_null())
                    .col(ColumnDef::new(Alias::new("start_time")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("end_time")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("duration_seconds")).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Alias::new("process_name")).string().not_null())
                    .col(ColumnDef::new(Alias::new("active_window")).string().not_null())
                    .col(ColumnDef::new(Alias::new("username")).string())
                    .col(ColumnDef::new(Alias::new("heartbeat_count")).integer().not_null().default(1))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_activity_sessions_machine")
                            .from(Alias::new("activity_sessions"), Alias::new("machine_id"))
                            .to(Alias::new("machines"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_activity_sessions_machine_end")
                    .table(Alias::new("activity_sessions"))
                    .col(Alias::new("machine_id"))
                    .col(Alias::new("end_time"))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("activity_sessions")).to_owned())
            .await
    }
}
