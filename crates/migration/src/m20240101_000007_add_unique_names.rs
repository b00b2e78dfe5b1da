use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// (index, table, soft deletable). Names are unique per project, ignoring case.
const UNIQUE_NAMES: [(&str, &str, bool); 3] = [
    ("uniq_team_project_name", "team", false),
    ("uniq_monitor_project_name", "monitor", true),
    ("uniq_api_key_project_name", "api_key", true),
];

fn create_sql(index: &str, table: &str, soft_deletable: bool) -> String {
    let live_rows = if soft_deletable { " WHERE deleted_at IS NULL" } else { "" };
    format!("CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} (project_id, lower(name)){live_rows}")
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for (index, table, soft_deletable) in UNIQUE_NAMES {
            db.execute_unprepared(&create_sql(index, table, soft_deletable)).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for (index, _, _) in UNIQUE_NAMES {
            db.execute_unprepared(&format!("DROP INDEX IF EXISTS {index}")).await?;
        }
        Ok(())
    }
}
