//! Create `monitor` table scoped to a project. Soft-deletable.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Monitor::Table)
                    .if_not_exists()
                    .col(uuid(Monitor::Id).primary_key())
                    .col(uuid(Monitor::ProjectId).not_null())
                    .col(string_len(Monitor::Name, 100).not_null())
                    .col(ColumnDef::new(Monitor::Description).text().null())
                    .col(string_len(Monitor::Slug, 100).unique_key().not_null())
                    .col(ColumnDef::new(Monitor::CreatedByUserId).uuid().null())
                    .col(ColumnDef::new(Monitor::DeletedByUserId).uuid().null())
                    .col(timestamp_with_time_zone(Monitor::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(Monitor::UpdatedAt).not_null())
                    .col(ColumnDef::new(Monitor::DeletedAt).timestamp_with_time_zone().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_monitor_project")
                            .from(Monitor::Table, Monitor::ProjectId)
                            .to(Project::Table, Project::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_monitor_created_by_user")
                            .from(Monitor::Table, Monitor::CreatedByUserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Monitor::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Monitor { Table, Id, ProjectId, Name, Description, Slug, CreatedByUserId, DeletedByUserId, CreatedAt, UpdatedAt, DeletedAt }

#[derive(DeriveIden)]
enum Project { Table, Id }

#[derive(DeriveIden)]
enum User { Table, Id }
