//! Request and result types of the generic database service.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use models::permission::{UserGlobalAccessPermission, UserProjectAccessPermission};

use crate::errors::DatabaseError;

pub use models::metadata::DatabaseRequestType;

/// Upper bound on rows returned by a single find.
pub const LIMIT_MAX: u64 = 10_000;

/// Dynamic column bag flowing through the service.
pub type Record = serde_json::Map<String, Value>;

/// Who is asking, and with which permissions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatabaseCommonInteractionProps {
    pub user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    /// Internal calls bypass every permission check.
    pub is_root: bool,
    pub user_global_access_permission: Option<UserGlobalAccessPermission>,
    pub user_project_access_permission: Option<UserProjectAccessPermission>,
}

impl DatabaseCommonInteractionProps {
    pub fn root() -> Self {
        Self { is_root: true, ..Default::default() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueryValue {
    Eq(Value),
    In(Vec<Value>),
    /// Case-insensitive substring match.
    Search(String),
    /// Case-insensitive equality.
    SameName(String),
    IsNull,
    NotNull,
}

impl QueryValue {
    pub fn from_json(value: Value) -> Result<Self, DatabaseError> {
        match value {
            Value::Null => Ok(QueryValue::IsNull),
            Value::Array(items) => Ok(QueryValue::In(items)),
            Value::Object(mut obj) => {
                let Some(kind) = obj.get("_type").and_then(Value::as_str).map(str::to_owned) else {
                    return Err(DatabaseError::bad_data("query object must carry a _type"));
                };
                let mut text = || match obj.remove("value") {
                    Some(Value::String(s)) => Ok(s),
                    Some(other) => Ok(other.to_string()),
                    None => Err(DatabaseError::bad_data(format!("{} query needs a value", kind))),
                };
                match kind.as_str() {
                    "Search" => Ok(QueryValue::Search(text()?)),
                    "SameName" => Ok(QueryValue::SameName(text()?)),
                    "NotNull" => Ok(QueryValue::NotNull),
                    "IsNull" => Ok(QueryValue::IsNull),
                    other => Err(DatabaseError::bad_data(format!("unknown query type {}", other))),
                }
            }
            scalar => Ok(QueryValue::Eq(scalar)),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            QueryValue::Eq(v) => v.clone(),
            QueryValue::In(items) => Value::Array(items.clone()),
            QueryValue::Search(s) => json!({"_type": "Search", "value": s}),
            QueryValue::SameName(s) => json!({"_type": "SameName", "value": s}),
            QueryValue::IsNull => Value::Null,
            QueryValue::NotNull => json!({"_type": "NotNull"}),
        }
    }
}

impl From<Uuid> for QueryValue {
    fn from(id: Uuid) -> Self { QueryValue::Eq(Value::String(id.to_string())) }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self { QueryValue::Eq(Value::String(s.to_owned())) }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self { QueryValue::Eq(Value::Bool(b)) }
}

/// Column name to constraint. All constraints must hold.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Record", into = "Record")]
pub struct Query(BTreeMap<String, QueryValue>);

impl Query {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn by_id(id: Uuid) -> Self { Self::new().with(models::metadata::ID_COLUMN, id) }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<QueryValue>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&QueryValue> { self.0.get(column) }
    pub fn contains(&self, column: &str) -> bool { self.0.contains_key(column) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn columns(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> { self.0.iter().map(|(k, v)| (k.as_str(), v)) }
}

impl TryFrom<Record> for Query {
    type Error = DatabaseError;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        let mut q = Query::new();
        for (column, value) in record {
            q.insert(column, QueryValue::from_json(value)?);
        }
        Ok(q)
    }
}

impl From<Query> for Record {
    fn from(q: Query) -> Self {
        q.0.into_iter().map(|(k, v)| (k, v.to_json())).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(alias = "ASC", alias = "asc")]
    Ascending,
    #[serde(alias = "DESC", alias = "desc")]
    Descending,
}

pub type Select = BTreeSet<String>;
pub type Sort = BTreeMap<String, SortOrder>;
/// Relation names to resolve into nested objects.
pub type Populate = BTreeSet<String>;

#[derive(Clone, Debug, Default)]
pub struct CreateBy {
    pub data: Record,
    pub props: DatabaseCommonInteractionProps,
}

#[derive(Clone, Debug, Default)]
pub struct FindBy {
    pub query: Query,
    pub select: Select,
    pub sort: Sort,
    pub populate: Populate,
    pub skip: u64,
    pub limit: u64,
    pub props: DatabaseCommonInteractionProps,
}

#[derive(Clone, Debug, Default)]
pub struct FindOneBy {
    pub query: Query,
    pub select: Select,
    pub sort: Sort,
    pub populate: Populate,
    pub props: DatabaseCommonInteractionProps,
}

#[derive(Clone, Debug, Default)]
pub struct FindOneById {
    pub id: Uuid,
    pub select: Select,
    pub populate: Populate,
    pub props: DatabaseCommonInteractionProps,
}

#[derive(Clone, Debug, Default)]
pub struct CountBy {
    pub query: Query,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub props: DatabaseCommonInteractionProps,
}

#[derive(Clone, Debug, Default)]
pub struct UpdateBy {
    pub query: Query,
    pub data: Record,
    pub props: DatabaseCommonInteractionProps,
}

pub type UpdateOneBy = UpdateBy;

#[derive(Clone, Debug, Default)]
pub struct UpdateById {
    pub id: Uuid,
    pub data: Record,
    pub props: DatabaseCommonInteractionProps,
}

#[derive(Clone, Debug, Default)]
pub struct DeleteBy {
    pub query: Query,
    pub props: DatabaseCommonInteractionProps,
}

pub type DeleteOneBy = DeleteBy;

#[derive(Clone, Debug, Default)]
pub struct SearchBy {
    pub query: Query,
    pub select: Select,
    pub sort: Sort,
    pub populate: Populate,
    pub skip: u64,
    pub limit: u64,
    pub props: DatabaseCommonInteractionProps,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub items: Vec<Record>,
    pub count: u64,
}
