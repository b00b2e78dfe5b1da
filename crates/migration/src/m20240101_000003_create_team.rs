//! Create `team`, `team_member` and `team_permission`, which together grant
//! project permissions to users.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Team::Table)
                    .if_not_exists()
                    .col(uuid(Team::Id).primary_key())
                    .col(uuid(Team::ProjectId).not_null())
                    .col(string_len(Team::Name, 100).not_null())
                    .col(ColumnDef::new(Team::Description).text().null())
                    .col(boolean(Team::IsPermissionsEditable).default(true))
                    .col(boolean(Team::IsTeamEditable).default(true))
                    .col(boolean(Team::IsTeamDeleteable).default(true))
                    .col(timestamp_with_time_zone(Team::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(Team::UpdatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_team_project")
                            .from(Team::Table, Team::ProjectId)
                            .to(Project::Table, Project::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TeamMember::Table)
                    .if_not_exists()
                    .col(uuid(TeamMember::Id).primary_key())
                    .col(uuid(TeamMember::ProjectId).not_null())
                    .col(uuid(TeamMember::TeamId).not_null())
                    .col(uuid(TeamMember::UserId).not_null())
                    .col(boolean(TeamMember::HasAcceptedInvitation).default(false))
                    .col(ColumnDef::new(TeamMember::InvitationAcceptedAt).timestamp_with_time_zone().null())
                    .col(timestamp_with_time_zone(TeamMember::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(TeamMember::UpdatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_team_member_project")
                            .from(TeamMember::Table, TeamMember::ProjectId)
                            .to(Project::Table, Project::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_team_member_team")
                            .from(TeamMember::Table, TeamMember::TeamId)
                            .to(Team::Table, Team::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_team_member_user")
                            .from(TeamMember::Table, TeamMember::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TeamPermission::Table)
                    .if_not_exists()
                    .col(uuid(TeamPermission::Id).primary_key())
                    .col(uuid(TeamPermission::ProjectId).not_null())
                    .col(uuid(TeamPermission::TeamId).not_null())
                    .col(string_len(TeamPermission::Permission, 64).not_null())
                    .col(timestamp_with_time_zone(TeamPermission::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(TeamPermission::UpdatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_team_permission_project")
                            .from(TeamPermission::Table, TeamPermission::ProjectId)
                            .to(Project::Table, Project::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_team_permission_team")
                            .from(TeamPermission::Table, TeamPermission::TeamId)
                            .to(Team::Table, Team::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(TeamPermission::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(TeamMember::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Team::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Team { Table, Id, ProjectId, Name, Description, IsPermissionsEditable, IsTeamEditable, IsTeamDeleteable, CreatedAt, UpdatedAt }

#[derive(DeriveIden)]
enum TeamMember { Table, Id, ProjectId, TeamId, UserId, HasAcceptedInvitation, InvitationAcceptedAt, CreatedAt, UpdatedAt }

#[derive(DeriveIden)]
enum TeamPermission { Table, Id, ProjectId, TeamId, Permission, CreatedAt, UpdatedAt }

#[derive(DeriveIden)]
enum Project { Table, Id }

#[derive(DeriveIden)]
enum User { Table, Id }
