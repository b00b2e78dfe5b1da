//! Migrator registering table migrations in foreign-key order.
//! Indexes are applied last.
pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_user;
mod m20240101_000002_create_project;
mod m20240101_000003_create_team;
mod m20240101_000004_create_monitor;
mod m20240101_000005_create_api_key;
mod m20240101_000006_add_indexes;
mod m20240101_000007_add_unique_names;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_user::Migration),
            Box::new(m20240101_000002_create_project::Migration),
            Box::new(m20240101_000003_create_team::Migration),
            Box::new(m20240101_000004_create_monitor::Migration),
            Box::new(m20240101_000005_create_api_key::Migration),
            // Indexes should always be applied last
            Box::new(m20240101_000006_add_indexes::Migration),
            Box::new(m20240101_000007_add_unique_names::Migration),
        ]
    }
}
