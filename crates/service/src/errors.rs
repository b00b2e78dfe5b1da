use sea_orm::{DbErr, SqlErr};
use thiserror::Error;
use tracing::debug;

use models::errors::ModelError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("{0}")]
    BadData(String),
    #[error("{0}")]
    NotAuthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("database not connected")]
    NotConnected,
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("database error: {0}")]
    Db(String),
}

impl DatabaseError {
    pub fn bad_data(msg: impl Into<String>) -> Self { Self::BadData(msg.into()) }
    pub fn not_authorized(msg: impl Into<String>) -> Self { Self::NotAuthorized(msg.into()) }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DatabaseError::BadData(_) => "bad_data",
            DatabaseError::NotAuthorized(_) => "not_authorized",
            DatabaseError::NotFound(_) => "not_found",
            DatabaseError::NotConnected => "not_connected",
            DatabaseError::Encryption(_) => "encryption",
            DatabaseError::Db(_) => "db",
        }
    }
}

impl From<DbErr> for DatabaseError {
    fn from(e: DbErr) -> Self {
        // races past the service-level checks land on the unique indexes
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = e.sql_err() {
            debug!(%detail, "unique constraint violated");
            return DatabaseError::bad_data("A record with the same value already exists.");
        }
        match e {
            DbErr::RecordNotFound(msg) => DatabaseError::NotFound(msg),
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => DatabaseError::NotConnected,
            other => DatabaseError::Db(other.to_string()),
        }
    }
}

impl From<common::CommonError> for DatabaseError {
    fn from(e: common::CommonError) -> Self {
        match e {
            common::CommonError::Encryption(msg) => DatabaseError::Encryption(msg),
            other => DatabaseError::Db(other.to_string()),
        }
    }
}

impl From<ModelError> for DatabaseError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Db(msg) => DatabaseError::Db(msg),
            other => DatabaseError::BadData(other.to_string()),
        }
    }
}
