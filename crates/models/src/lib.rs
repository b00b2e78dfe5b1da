//! SeaORM entities plus the access-control metadata that drives the generic
//! database service.

pub mod db;
pub mod errors;
pub mod metadata;
pub mod permission;

pub mod api_key;
pub mod monitor;
pub mod project;
pub mod team;
pub mod team_member;
pub mod team_permission;
pub mod user;

pub use metadata::{CrudEntity, DatabaseRequestType, ModelMetadata};
pub use permission::Permission;

#[cfg(test)]
mod tests;
