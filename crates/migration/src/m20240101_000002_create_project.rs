//! Create `project` table, the tenant root. Soft-deletable.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Project::Table)
                    .if_not_exists()
                    .col(uuid(Project::Id).primary_key())
                    .col(string_len(Project::Name, 100).not_null())
                    .col(string_len(Project::Slug, 100).unique_key().not_null())
                    .col(ColumnDef::new(Project::CreatedByUserId).uuid().null())
                    .col(ColumnDef::new(Project::DeletedByUserId).uuid().null())
                    .col(timestamp_with_time_zone(Project::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(Project::UpdatedAt).not_null())
                    .col(ColumnDef::new(Project::DeletedAt).timestamp_with_time_zone().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_project_created_by_user")
                            .from(Project::Table, Project::CreatedByUserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Project::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Project { Table, Id, Name, Slug, CreatedByUserId, DeletedByUserId, CreatedAt, UpdatedAt, DeletedAt }

#[derive(DeriveIden)]
enum User { Table, Id }
