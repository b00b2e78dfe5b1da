use once_cell::sync::Lazy;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::metadata::{CrudEntity, ModelMetadata, RelationMeta, TableAccessControl, TableColumn, TableColumnType};
use crate::permission::Permission;
use crate::user;

/// A tenant. Every project-scoped record points at one of these.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_by_user_id: Option<Uuid>,
    pub deleted_by_user_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    CreatedByUser,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self { Relation::CreatedByUser => Entity::belongs_to(user::Entity).from(Column::CreatedByUserId).to(user::Column::Id).into() }
    }
}

impl ActiveModelBehavior for ActiveModel {}

static METADATA: Lazy<ModelMetadata> = Lazy::new(|| {
    use Permission::*;
    let read = [ProjectOwner, ProjectAdmin, ProjectMember, User];
    ModelMetadata::new("project", "Project", "Projects")
        .crud_api_path("/project")
        .base_columns()
        // a project is its own tenant
        .project_column("id")
        .slugify("name", "slug")
        .table_access(TableAccessControl {
            create: vec![User],
            read: read.to_vec(),
            update: vec![ProjectOwner, ProjectAdmin],
            delete: vec![ProjectOwner],
        })
        .column(TableColumn::new("name", TableColumnType::ShortText).required().access(&[User], &read, &[ProjectOwner, ProjectAdmin]))
        .column(TableColumn::new("slug", TableColumnType::Slug).required().unique().access(&[User], &read, &[]))
        .column(TableColumn::new("created_by_user_id", TableColumnType::Entity).access(&[], &read, &[]))
        .column(TableColumn::new("deleted_by_user_id", TableColumnType::ObjectId).access(&[], &[ProjectOwner], &[]))
        .column(TableColumn::new("deleted_at", TableColumnType::Date))
        .relation(RelationMeta { name: "created_by_user", column: "created_by_user_id", table: "user", select: vec!["id", "name"] })
});

impl CrudEntity for Entity {
    fn metadata() -> &'static ModelMetadata { &METADATA }
}
