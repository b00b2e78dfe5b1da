use once_cell::sync::Lazy;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::metadata::{CrudEntity, ModelMetadata, RelationMeta, TableAccessControl, TableColumn, TableColumnType};
use crate::permission::Permission;
use crate::{project, user};

/// Project API key. The key itself is generated server-side and stored encrypted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "api_key")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub expires_at: DateTimeWithTimeZone,
    pub api_key: String,
    pub iv: Option<String>,
    pub created_by_user_id: Option<Uuid>,
    pub deleted_by_user_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Project,
    CreatedByUser,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Project => Entity::belongs_to(project::Entity).from(Column::ProjectId).to(project::Column::Id).into(),
            Relation::CreatedByUser => Entity::belongs_to(user::Entity).from(Column::CreatedByUserId).to(user::Column::Id).into(),
        }
    }
}

impl ActiveModelBehavior for ActiveModel {}

static METADATA: Lazy<ModelMetadata> = Lazy::new(|| {
    use Permission::*;
    let create = [ProjectOwner, ProjectAdmin, CanCreateProjectApiKey];
    let read = [ProjectOwner, ProjectAdmin, ProjectMember, CanReadProjectApiKey];
    let update = [ProjectOwner, ProjectAdmin, CanEditProjectApiKey];
    ModelMetadata::new("api_key", "API Key", "API Keys")
        .crud_api_path("/api-key")
        .base_columns()
        .project_column("project_id")
        .unique_column_by("name", "project_id")
        .table_access(TableAccessControl {
            create: create.to_vec(),
            read: read.to_vec(),
            update: update.to_vec(),
            delete: vec![ProjectOwner, ProjectAdmin, CanDeleteProjectApiKey],
        })
        .column(TableColumn::new("project_id", TableColumnType::Entity).required().access(&create, &read, &[]))
        .column(TableColumn::new("name", TableColumnType::ShortText).required().access(&create, &read, &update))
        .column(TableColumn::new("description", TableColumnType::LongText).access(&create, &read, &update))
        .column(TableColumn::new("expires_at", TableColumnType::Date).required().access(&create, &read, &update))
        .column(
            TableColumn::new("api_key", TableColumnType::LongText)
                .required()
                .encrypted()
                .access(&[], &[ProjectOwner, ProjectAdmin, CanReadProjectApiKey], &[]),
        )
        .column(TableColumn::new("iv", TableColumnType::ShortText))
        .column(TableColumn::new("created_by_user_id", TableColumnType::Entity).access(&[], &read, &[]))
        .column(TableColumn::new("deleted_by_user_id", TableColumnType::ObjectId).access(&[], &[ProjectOwner, ProjectAdmin], &[]))
        .column(TableColumn::new("deleted_at", TableColumnType::Date))
        .relation(RelationMeta { name: "created_by_user", column: "created_by_user_id", table: "user", select: vec!["id", "name"] })
});

impl CrudEntity for Entity {
    fn metadata() -> &'static ModelMetadata { &METADATA }
}
