//! Static description of a model: columns, access control, tenancy and
//! relations. The database service and the client read everything they
//! need to know about an entity from here.

use std::collections::BTreeMap;
use std::fmt;

use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permission::Permission;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
pub const DELETED_AT_COLUMN: &str = "deleted_at";
pub const DELETED_BY_USER_COLUMN: &str = "deleted_by_user_id";
pub const IV_COLUMN: &str = "iv";
/// Width of short text and slug columns unless a column says otherwise.
pub const SHORT_TEXT_MAX_LEN: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseRequestType {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for DatabaseRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatabaseRequestType::Create => "create",
            DatabaseRequestType::Read => "read",
            DatabaseRequestType::Update => "update",
            DatabaseRequestType::Delete => "delete",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableColumnType {
    ObjectId,
    ShortText,
    LongText,
    Slug,
    Boolean,
    Number,
    Date,
    Json,
    HashedString,
    /// Many-to-one relation stored through a foreign-key column.
    Entity,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAccessControl {
    pub create: Vec<Permission>,
    pub read: Vec<Permission>,
    pub update: Vec<Permission>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAccessControl {
    pub create: Vec<Permission>,
    pub read: Vec<Permission>,
    pub update: Vec<Permission>,
    pub delete: Vec<Permission>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableColumn {
    pub name: &'static str,
    pub column_type: TableColumnType,
    pub required: bool,
    pub unique: bool,
    pub default_value: Option<Value>,
    pub encrypted: bool,
    pub hashed: bool,
    /// Longest text value the column holds, in characters.
    pub max_length: Option<usize>,
    pub access: Option<ColumnAccessControl>,
}

impl TableColumn {
    pub fn new(name: &'static str, column_type: TableColumnType) -> Self {
        Self {
            name,
            column_type,
            required: false,
            unique: false,
            default_value: None,
            encrypted: false,
            hashed: column_type == TableColumnType::HashedString,
            max_length: matches!(column_type, TableColumnType::ShortText | TableColumnType::Slug)
                .then_some(SHORT_TEXT_MAX_LEN),
            access: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn access(mut self, create: &[Permission], read: &[Permission], update: &[Permission]) -> Self {
        self.access = Some(ColumnAccessControl {
            create: create.to_vec(),
            read: read.to_vec(),
            update: update.to_vec(),
        });
        self
    }
}

/// Populatable many-to-one relation: `column` here references `id` on `table`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationMeta {
    pub name: &'static str,
    pub column: &'static str,
    pub table: &'static str,
    pub select: Vec<&'static str>,
}

/// Extra row constraint applied when the caller holds `permission`.
#[derive(Clone, Debug, PartialEq)]
pub struct PermissionIf {
    pub permission: Permission,
    pub column: &'static str,
    pub value: Value,
}

#[derive(Clone, Debug)]
pub struct ModelMetadata {
    pub table_name: &'static str,
    pub singular_name: &'static str,
    pub plural_name: &'static str,
    pub crud_api_path: Option<&'static str>,
    pub table_access: TableAccessControl,
    pub columns: Vec<TableColumn>,
    pub project_column: Option<&'static str>,
    pub user_column: Option<&'static str>,
    pub slugify: Option<(&'static str, &'static str)>,
    pub unique_columns_by: Vec<(&'static str, &'static str)>,
    pub is_permission_if: Vec<PermissionIf>,
    pub relations: Vec<RelationMeta>,
}

impl ModelMetadata {
    pub fn new(table_name: &'static str, singular_name: &'static str, plural_name: &'static str) -> Self {
        Self {
            table_name,
            singular_name,
            plural_name,
            crud_api_path: None,
            table_access: TableAccessControl::default(),
            columns: Vec::new(),
            project_column: None,
            user_column: None,
            slugify: None,
            unique_columns_by: Vec::new(),
            is_permission_if: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn crud_api_path(mut self, path: &'static str) -> Self {
        self.crud_api_path = Some(path);
        self
    }

    pub fn table_access(mut self, access: TableAccessControl) -> Self {
        self.table_access = access;
        self
    }

    pub fn column(mut self, column: TableColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// `id`, `created_at` and `updated_at`, which every table carries.
    pub fn base_columns(self) -> Self {
        self.column(TableColumn::new(ID_COLUMN, TableColumnType::ObjectId))
            .column(TableColumn::new(CREATED_AT_COLUMN, TableColumnType::Date))
            .column(TableColumn::new(UPDATED_AT_COLUMN, TableColumnType::Date))
    }

    pub fn project_column(mut self, column: &'static str) -> Self {
        self.project_column = Some(column);
        self
    }

    pub fn user_column(mut self, column: &'static str) -> Self {
        self.user_column = Some(column);
        self
    }

    pub fn slugify(mut self, source: &'static str, target: &'static str) -> Self {
        self.slugify = Some((source, target));
        self
    }

    pub fn unique_column_by(mut self, column: &'static str, scope: &'static str) -> Self {
        self.unique_columns_by.push((column, scope));
        self
    }

    pub fn permission_if(mut self, permission: Permission, column: &'static str, value: Value) -> Self {
        self.is_permission_if.push(PermissionIf { permission, column, value });
        self
    }

    pub fn relation(mut self, relation: RelationMeta) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn column_meta(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_meta(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn required_columns(&self) -> Vec<&'static str> {
        self.columns.iter().filter(|c| c.required).map(|c| c.name).collect()
    }

    pub fn encrypted_columns(&self) -> Vec<&'static str> {
        self.columns.iter().filter(|c| c.encrypted).map(|c| c.name).collect()
    }

    pub fn hashed_columns(&self) -> Vec<&'static str> {
        self.columns.iter().filter(|c| c.hashed).map(|c| c.name).collect()
    }

    pub fn is_entity_column(&self, name: &str) -> bool {
        self.column_meta(name)
            .map(|c| c.column_type == TableColumnType::Entity)
            .unwrap_or(false)
    }

    pub fn is_default_value_column(&self, name: &str) -> bool {
        self.column_meta(name).map(|c| c.default_value.is_some()).unwrap_or(false)
    }

    pub fn column_access_control_for_all_columns(&self) -> BTreeMap<&'static str, &ColumnAccessControl> {
        self.columns
            .iter()
            .filter_map(|c| c.access.as_ref().map(|a| (c.name, a)))
            .collect()
    }

    pub fn record_permissions(&self, request: DatabaseRequestType) -> &[Permission] {
        match request {
            DatabaseRequestType::Create => &self.table_access.create,
            DatabaseRequestType::Read => &self.table_access.read,
            DatabaseRequestType::Update => &self.table_access.update,
            DatabaseRequestType::Delete => &self.table_access.delete,
        }
    }

    pub fn is_soft_deletable(&self) -> bool {
        self.has_column(DELETED_AT_COLUMN)
    }

    pub fn relation_meta(&self, name: &str) -> Option<&RelationMeta> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// The relation stored through foreign-key `column`.
    pub fn relation_for_column(&self, column: &str) -> Option<&RelationMeta> {
        self.relations.iter().find(|r| r.column == column)
    }
}

/// An entity the generic database service can operate on.
pub trait CrudEntity: EntityTrait {
    fn metadata() -> &'static ModelMetadata;
}
