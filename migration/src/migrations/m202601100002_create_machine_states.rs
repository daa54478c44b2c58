use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202601100002_create_machine_states"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("machine_states"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("machine_id")).string().not_null().primary_key())
                    .col(ColumnDef::new(Alias::new("active_window")).string())
                    .col(ColumnDef::new(Alias::new("screenshot_count")).integer().not_null().default(0))
                    .col(ColumnDef::new(Alias::new("upload_count")).integer().not_null().default(0))
                    .col(ColumnDef::new(Alias::new("health_status")).string())
                    .col(ColumnDef::new(Alias::new("last_activity_time")).big_integer())
                    .col(ColumnDef::new(Alias::new("agent_version")).string())
                    .col(ColumnDef::new(Alias::new("settings")).json())
                    .col(ColumnDef::new(Alias::new("applied_settings")).json())
                    .col(ColumnDef::new(Alias::new("ping_health")).string())
                    .col(ColumnDef::new(Alias::new("ping_latency_ms")).big_integer())
                    .col(ColumnDef::new(Alias::new("last_ping_at")).timestamp())
                    .col(ColumnDef::new(Alias::new("last_ping_success")).timestamp())
                    .col(ColumnDef::new(Alias::new("updated_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_machine_states_machine")
                            .from(Alias::new("machine_states"), Alias::new("machine_id"))
                            .to(Alias::new("machines"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("machine_states")).to_owned())
            .await
    }
}
