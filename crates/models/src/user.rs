use once_cell::sync::Lazy;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors;
use crate::metadata::{CrudEntity, ModelMetadata, TableAccessControl, TableColumn, TableColumnType};
use crate::permission::Permission;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef { panic!("no relations defined here") }
}

impl ActiveModelBehavior for ActiveModel {}

static METADATA: Lazy<ModelMetadata> = Lazy::new(|| {
    use Permission::*;
    ModelMetadata::new("user", "User", "Users")
        .base_columns()
        .user_column("id")
        .table_access(TableAccessControl {
            create: vec![Public],
            read: vec![CurrentUser],
            update: vec![CurrentUser],
            delete: vec![],
        })
        .column(TableColumn::new("email", TableColumnType::ShortText).required().unique().max_length(255).access(&[Public], &[CurrentUser], &[]))
        .column(TableColumn::new("name", TableColumnType::ShortText).required().access(&[Public], &[CurrentUser, ProjectMember], &[CurrentUser]))
        .column(TableColumn::new("password", TableColumnType::HashedString).required().access(&[Public], &[], &[CurrentUser]))
});

impl CrudEntity for Entity {
    fn metadata() -> &'static ModelMetadata { &METADATA }
}

pub fn validate_email(email: &str) -> Result<(), errors::ModelError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') => Ok(()),
        _ => Err(errors::ModelError::invalid("email", "expected name@domain")),
    }
}

pub fn validate_name(name: &str) -> Result<(), errors::ModelError> {
    if name.trim().is_empty() { return Err(errors::ModelError::invalid("name", "required")); }
    if name.len() > 100 { return Err(errors::ModelError::invalid("name", "at most 100 characters")); }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), errors::ModelError> {
    if password.len() < 8 { return Err(errors::ModelError::invalid("password", "at least 8 characters")); }
    Ok(())
}
