use once_cell::sync::Lazy;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::metadata::{CrudEntity, ModelMetadata, RelationMeta, TableAccessControl, TableColumn, TableColumnType};
use crate::permission::Permission;
use crate::project;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "team")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_permissions_editable: bool,
    pub is_team_editable: bool,
    pub is_team_deleteable: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Project,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self { Relation::Project => Entity::belongs_to(project::Entity).from(Column::ProjectId).to(project::Column::Id).into() }
    }
}

impl ActiveModelBehavior for ActiveModel {}

static METADATA: Lazy<ModelMetadata> = Lazy::new(|| {
    use Permission::*;
    let create = [ProjectOwner, ProjectAdmin, CanCreateProjectTeam];
    let read = [ProjectOwner, ProjectAdmin, ProjectMember, CanReadProjectTeam];
    let update = [ProjectOwner, ProjectAdmin, CanEditProjectTeam];
    ModelMetadata::new("team", "Team", "Teams")
        .crud_api_path("/team")
        .base_columns()
        .project_column("project_id")
        .unique_column_by("name", "project_id")
        .table_access(TableAccessControl {
            create: create.to_vec(),
            read: read.to_vec(),
            update: update.to_vec(),
            delete: vec![ProjectOwner, ProjectAdmin, CanDeleteProjectTeam],
        })
        .column(TableColumn::new("project_id", TableColumnType::Entity).required().access(&create, &read, &[]))
        .column(TableColumn::new("name", TableColumnType::ShortText).required().access(&create, &read, &update))
        .column(TableColumn::new("description", TableColumnType::LongText).access(&create, &read, &update))
        .column(TableColumn::new("is_permissions_editable", TableColumnType::Boolean).required().default_value(json!(true)).access(&[], &read, &[]))
        .column(TableColumn::new("is_team_editable", TableColumnType::Boolean).required().default_value(json!(true)).access(&[], &read, &[]))
        .column(TableColumn::new("is_team_deleteable", TableColumnType::Boolean).required().default_value(json!(true)).access(&[], &read, &[]))
        .relation(RelationMeta { name: "project", column: "project_id", table: "project", select: vec!["id", "name"] })
});

impl CrudEntity for Entity {
    fn metadata() -> &'static ModelMetadata { &METADATA }
}
