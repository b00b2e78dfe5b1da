//! Create `api_key` table. The key column holds ciphertext; `iv` is per row.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiKey::Table)
                    .if_not_exists()
                    .col(uuid(ApiKey::Id).primary_key())
                    .col(uuid(ApiKey::ProjectId).not_null())
                    .col(string_len(ApiKey::Name, 100).not_null())
                    .col(ColumnDef::new(ApiKey::Description).text().null())
                    .col(timestamp_with_time_zone(ApiKey::ExpiresAt).not_null())
                    .col(text(ApiKey::ApiKey).not_null())
                    .col(ColumnDef::new(ApiKey::Iv).string_len(32).null())
                    .col(ColumnDef::new(ApiKey::CreatedByUserId).uuid().null())
                    .col(ColumnDef::new(ApiKey::DeletedByUserId).uuid().null())
                    .col(timestamp_with_time_zone(ApiKey::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(ApiKey::UpdatedAt).not_null())
                    .col(ColumnDef::new(ApiKey::DeletedAt).timestamp_with_time_zone().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_api_key_project")
                            .from(ApiKey::Table, ApiKey::ProjectId)
                            .to(Project::Table, Project::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_api_key_created_by_user")
                            .from(ApiKey::Table, ApiKey::CreatedByUserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(ApiKey::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum ApiKey { Table, Id, ProjectId, Name, Description, ExpiresAt, ApiKey, Iv, CreatedByUserId, DeletedByUserId, CreatedAt, UpdatedAt, DeletedAt }

#[derive(DeriveIden)]
enum Project { Table, Id }

#[derive(DeriveIden)]
enum User { Table, Id }
