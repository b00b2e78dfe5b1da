use once_cell::sync::Lazy;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::metadata::{CrudEntity, ModelMetadata, RelationMeta, TableAccessControl, TableColumn, TableColumnType};
use crate::permission::Permission;
use crate::{project, user};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitor")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub slug: String,
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

impl Related<project::Entity> for Entity {
    fn to() -> RelationDef { Relation::Project.def() }
}

impl ActiveModelBehavior for ActiveModel {}

static METADATA: Lazy<ModelMetadata> = Lazy::new(|| {
    use Permission::*;
    let create = [ProjectOwner, CanCreateProjectMonitor];
    let read = [ProjectOwner, CanReadProjectMonitor, ProjectMember];
    let update = [ProjectOwner, CanEditProjectMonitor];
    ModelMetadata::new("monitor", "Monitor", "Monitors")
        .crud_api_path("/monitor")
        .base_columns()
        .project_column("project_id")
        .slugify("name", "slug")
        .unique_column_by("name", "project_id")
        .table_access(TableAccessControl {
            create: create.to_vec(),
            read: read.to_vec(),
            update: update.to_vec(),
            delete: vec![ProjectOwner, CanDeleteProjectMonitor],
        })
        .column(TableColumn::new("project_id", TableColumnType::Entity).required().access(&create, &read, &[]))
        .column(TableColumn::new("name", TableColumnType::ShortText).required().access(&create, &read, &update))
        .column(TableColumn::new("description", TableColumnType::LongText).access(&create, &read, &update))
        .column(TableColumn::new("slug", TableColumnType::Slug).required().unique().access(&create, &read, &[]))
        .column(TableColumn::new("created_by_user_id", TableColumnType::Entity).access(&create, &read, &[]))
        .column(TableColumn::new("deleted_by_user_id", TableColumnType::ObjectId).access(&[], &[ProjectMember], &[]))
        .column(TableColumn::new("deleted_at", TableColumnType::Date))
        .relation(RelationMeta { name: "project", column: "project_id", table: "project", select: vec!["id", "name"] })
        .relation(RelationMeta { name: "created_by_user", column: "created_by_user_id", table: "user", select: vec!["id", "name"] })
});

impl CrudEntity for Entity {
    fn metadata() -> &'static ModelMetadata { &METADATA }
}
