use async_trait::async_trait;
use serde_json::Value;

use models::monitor;

use crate::database::DatabaseService;
use crate::errors::DatabaseError;
use crate::hooks::DatabaseHooks;
use crate::types::CreateBy;

pub type MonitorService = DatabaseService<monitor::Entity, MonitorHooks>;

#[derive(Clone, Copy, Debug, Default)]
pub struct MonitorHooks;

#[async_trait]
impl DatabaseHooks<monitor::Entity> for MonitorHooks {
    async fn on_before_create(&self, mut create_by: CreateBy) -> Result<CreateBy, DatabaseError> {
        if let Some(user_id) = create_by.props.user_id {
            create_by
                .data
                .entry("created_by_user_id")
                .or_insert_with(|| Value::String(user_id.to_string()));
        }
        Ok(create_by)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::project::record;
    use crate::types::DatabaseCommonInteractionProps;

    #[tokio::test]
    async fn creator_defaults_to_caller() {
        let user_id = Uuid::new_v4();
        let props = DatabaseCommonInteractionProps { user_id: Some(user_id), ..Default::default() };
        let create_by = MonitorHooks
            .on_before_create(CreateBy { data: record(json!({"name": "API"})), props: props.clone() })
            .await
            .unwrap();
        assert_eq!(create_by.data["created_by_user_id"], json!(user_id.to_string()));

        let other = Uuid::new_v4().to_string();
        let create_by = MonitorHooks
            .on_before_create(CreateBy { data: record(json!({"created_by_user_id": other})), props })
            .await
            .unwrap();
        assert_eq!(create_by.data["created_by_user_id"], json!(other));
    }
}
