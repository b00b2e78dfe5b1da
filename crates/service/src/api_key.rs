use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use models::api_key;

use crate::database::DatabaseService;
use crate::errors::DatabaseError;
use crate::hooks::DatabaseHooks;
use crate::types::{CreateBy, Record, UpdateBy};

pub type ApiKeyService = DatabaseService<api_key::Entity, ApiKeyHooks>;

/// Generates the key server-side and keeps expiry dates in the future.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApiKeyHooks;

pub fn generate_api_key() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn check_expiry(data: &Record) -> Result<(), DatabaseError> {
    let Some(raw) = data.get("expires_at") else { return Ok(()) };
    let expires_at = raw
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .ok_or_else(|| DatabaseError::bad_data("expires_at is not a valid date"))?;
    if expires_at <= Utc::now() {
        return Err(DatabaseError::bad_data("Expires at should be a date in the future."));
    }
    Ok(())
}

#[async_trait]
impl DatabaseHooks<api_key::Entity> for ApiKeyHooks {
    async fn on_before_create(&self, mut create_by: CreateBy) -> Result<CreateBy, DatabaseError> {
        check_expiry(&create_by.data)?;
        create_by.data.insert("api_key".into(), Value::String(generate_api_key()));
        if let Some(user_id) = create_by.props.user_id {
            create_by.data.insert("created_by_user_id".into(), Value::String(user_id.to_string()));
        }
        Ok(create_by)
    }

    async fn on_before_update(&self, update_by: UpdateBy) -> Result<UpdateBy, DatabaseError> {
        check_expiry(&update_by.data)?;
        Ok(update_by)
    }
}
