//! Service layer: the permissioned generic CRUD engine and the model
//! services built on it.
//! - `database` runs every CRUD operation for any entity with metadata.
//! - `project`, `team`, `monitor` and `api_key` add model hooks.
//! - `access` resolves caller permissions; `auth` issues tokens.

pub mod access;
pub mod api_key;
pub mod auth;
pub mod database;
pub mod errors;
pub mod hooks;
pub mod monitor;
pub mod project;
mod query;
pub mod team;
#[cfg(test)]
pub mod test_support;
pub mod types;

pub use access::AccessService;
pub use database::{DatabaseService, DbHandle};
pub use errors::DatabaseError;
pub use hooks::{DatabaseHooks, NoHooks};
pub use types::*;
