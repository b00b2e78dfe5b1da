use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const PROJECT_SCOPED: [(&str, &str); 5] = [
    ("idx_team_project", "team"),
    ("idx_team_member_project", "team_member"),
    ("idx_team_permission_project", "team_permission"),
    ("idx_monitor_project", "monitor"),
    ("idx_api_key_project", "api_key"),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, table) in PROJECT_SCOPED {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(Alias::new(table))
                        .col(Alias::new("project_id"))
                        .to_owned(),
                )
                .await?;
        }

        // TeamMember: a user joins a team once
        manager
            .create_index(
                Index::create()
                    .name("uniq_team_member_user_team")
                    .table(TeamMember::Table)
                    .col(TeamMember::UserId)
                    .col(TeamMember::TeamId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uniq_team_member_user_team").table(TeamMember::Table).to_owned())
            .await?;
        for (name, table) in PROJECT_SCOPED {
            manager
                .drop_index(Index::drop().name(name).table(Alias::new(table)).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum TeamMember { Table, UserId, TeamId }
