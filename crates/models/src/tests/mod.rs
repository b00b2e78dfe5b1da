
/// Raw entity CRUD against the migrated schema
pub mod crud_tests;


use anyhow::Result;
use chrono::Utc;
use migration::MigratorTrait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

use crate::{db::connect, project, user};

/// Connects and migrates, or returns `None` when DB tests are disabled.
pub(crate) async fn setup_test_db() -> Result<Option<DatabaseConnection>> {
    if std::env::var("SKIP_DB_TESTS").is_ok() {
        return Ok(None);
    }
    let db = match connect().await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("skip: cannot connect to db: {}", e);
            return Ok(None);
        }
    };
    migration::Migrator::up(&db, None).await?;
    Ok(Some(db))
}

pub(crate) async fn insert_user(db: &DatabaseConnection) -> Result<user::Model> {
    let now = Utc::now();
    let am = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(format!("user_{}@example.com", Uuid::new_v4())),
        name: Set("Test User".into()),
        password: Set(format!("sha256${}", "0".repeat(64))),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    Ok(am.insert(db).await?)
}

pub(crate) async fn insert_project(db: &DatabaseConnection, owner: Uuid) -> Result<project::Model> {
    let now = Utc::now();
    let am = project::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Test Project".into()),
        slug: Set(format!("test-project-{}", Uuid::new_v4().simple())),
        created_by_user_id: Set(Some(owner)),
        deleted_by_user_id: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        deleted_at: Set(None),
    };
    Ok(am.insert(db).await?)
}
