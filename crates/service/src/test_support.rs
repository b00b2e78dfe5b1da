#![cfg(test)]
use std::sync::Arc;

use tokio::sync::OnceCell;
use migration::MigratorTrait;
use models::db::{connect_with_config, DatabaseConfig};
use serde_json::json;
use uuid::Uuid;

use crate::database::{DatabaseService, DbHandle};
use crate::project::record;
use crate::types::{CreateBy, DatabaseCommonInteractionProps};

pub const TEST_SECRET: &str = "service-test-secret";

// Ensure migrations run only once across the entire test process
static MIGRATED: OnceCell<bool> = OnceCell::const_new();

/// `None` when DB tests are disabled or the database is unreachable.
pub async fn get_db() -> Option<DbHandle> {
    if std::env::var("SKIP_DB_TESTS").is_ok() {
        return None;
    }
    let ready = *MIGRATED
        .get_or_init(|| async {
            let cfg = DatabaseConfig::from_file().unwrap_or_else(|_| DatabaseConfig::from_env());
            let Ok(db) = connect_with_config(&cfg).await else { return false };
            let ok = migration::Migrator::up(&db, None).await.is_ok();
            drop(db);
            ok
        })
        .await;
    if !ready {
        return None;
    }

    // Return a fresh connection for the current test's runtime
    let mut cfg = DatabaseConfig::from_file().unwrap_or_else(|_| DatabaseConfig::from_env());
    cfg.max_connections = cfg.max_connections.max(5);
    cfg.min_connections = cfg.min_connections.min(1);
    cfg.acquire_timeout = std::time::Duration::from_secs(10);
    connect_with_config(&cfg).await.ok().map(Arc::new)
}

pub async fn create_user(db: &DbHandle) -> Uuid {
    let email = format!("svc_{}@example.com", Uuid::new_v4().simple());
    let created = DatabaseService::<models::user::Entity>::new(Arc::clone(db), TEST_SECRET)
        .create(CreateBy {
            data: record(json!({"email": email, "name": "Service Test", "password": "password123"})),
            props: DatabaseCommonInteractionProps::root(),
        })
        .await
        .expect("create user");
    created["id"].as_str().and_then(|s| Uuid::parse_str(s).ok()).expect("user id")
}
