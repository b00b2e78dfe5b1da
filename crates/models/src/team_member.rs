use once_cell::sync::Lazy;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::metadata::{CrudEntity, ModelMetadata, RelationMeta, TableAccessControl, TableColumn, TableColumnType};
use crate::permission::Permission;
use crate::{project, team, user};

/// Membership of a user in a team. Only accepted memberships grant access.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "team_member")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub has_accepted_invitation: bool,
    pub invitation_accepted_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Project,
    Team,
    User,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Project => Entity::belongs_to(project::Entity).from(Column::ProjectId).to(project::Column::Id).into(),
            Relation::Team => Entity::belongs_to(team::Entity).from(Column::TeamId).to(team::Column::Id).into(),
            Relation::User => Entity::belongs_to(user::Entity).from(Column::UserId).to(user::Column::Id).into(),
        }
    }
}

impl ActiveModelBehavior for ActiveModel {}

static METADATA: Lazy<ModelMetadata> = Lazy::new(|| {
    use Permission::*;
    let manage = [ProjectOwner, ProjectAdmin, CanEditProjectTeam];
    let read = [ProjectOwner, ProjectAdmin, ProjectMember, CanReadProjectTeam];
    ModelMetadata::new("team_member", "Team Member", "Team Members")
        .crud_api_path("/team-member")
        .base_columns()
        .project_column("project_id")
        .user_column("user_id")
        .table_access(TableAccessControl {
            create: manage.to_vec(),
            read: read.to_vec(),
            update: vec![ProjectOwner, ProjectAdmin, CurrentUser],
            delete: manage.to_vec(),
        })
        .column(TableColumn::new("project_id", TableColumnType::Entity).required().access(&manage, &read, &[]))
        .column(TableColumn::new("team_id", TableColumnType::Entity).required().access(&manage, &read, &[]))
        .column(TableColumn::new("user_id", TableColumnType::Entity).required().access(&manage, &read, &[]))
        .column(TableColumn::new("has_accepted_invitation", TableColumnType::Boolean).required().default_value(json!(false)).access(&[], &read, &[CurrentUser]))
        .column(TableColumn::new("invitation_accepted_at", TableColumnType::Date).access(&[], &read, &[CurrentUser]))
        .relation(RelationMeta { name: "team", column: "team_id", table: "team", select: vec!["id", "name"] })
        .relation(RelationMeta { name: "user", column: "user_id", table: "user", select: vec!["id", "name"] })
});

impl CrudEntity for Entity {
    fn metadata() -> &'static ModelMetadata { &METADATA }
}
