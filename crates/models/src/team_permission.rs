use once_cell::sync::Lazy;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::metadata::{CrudEntity, ModelMetadata, RelationMeta, TableAccessControl, TableColumn, TableColumnType};
use crate::permission::Permission;
use crate::{project, team};

/// A permission granted to every member of a team inside one project.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "team_permission")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub team_id: Uuid,
    pub permission: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn parsed_permission(&self) -> Result<Permission, ModelError> {
        self.permission.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Project,
    Team,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Project => Entity::belongs_to(project::Entity).from(Column::ProjectId).to(project::Column::Id).into(),
            Relation::Team => Entity::belongs_to(team::Entity).from(Column::TeamId).to(team::Column::Id).into(),
        }
    }
}

impl ActiveModelBehavior for ActiveModel {}

static METADATA: Lazy<ModelMetadata> = Lazy::new(|| {
    use Permission::*;
    let manage = [ProjectOwner, ProjectAdmin];
    let read = [ProjectOwner, ProjectAdmin, ProjectMember, CanReadProjectTeam];
    ModelMetadata::new("team_permission", "Team Permission", "Team Permissions")
        .crud_api_path("/team-permission")
        .base_columns()
        .project_column("project_id")
        .table_access(TableAccessControl {
            create: manage.to_vec(),
            read: read.to_vec(),
            update: manage.to_vec(),
            delete: manage.to_vec(),
        })
        .column(TableColumn::new("project_id", TableColumnType::Entity).required().access(&manage, &read, &[]))
        .column(TableColumn::new("team_id", TableColumnType::Entity).required().access(&manage, &read, &[]))
        .column(TableColumn::new("permission", TableColumnType::ShortText).required().max_length(64).access(&manage, &read, &manage))
        .relation(RelationMeta { name: "team", column: "team_id", table: "team", select: vec!["id", "name"] })
});

impl CrudEntity for Entity {
    fn metadata() -> &'static ModelMetadata { &METADATA }
}
