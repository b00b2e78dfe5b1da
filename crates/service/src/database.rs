//! Generic, metadata-driven CRUD over any [`CrudEntity`].
//!
//! Every operation runs the same pipeline: model hooks, permission
//! rewriting of the request (column ACLs, tenant scoping, owner
//! constraints), column encryption/hashing, then the SQL itself. Records
//! travel as JSON maps so one implementation serves every model.

use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::{Alias, Expr, Order, Query as SeaQuery, SimpleExpr};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult, JsonValue, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Value as SeaValue,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use common::crypto::{hash_value, is_value_hashed, verify_hashed, Encryption};
use common::metrics;
use common::slug::{get_slug, SLUG_MAX_LEN};
use models::metadata::{
    ColumnAccessControl, CrudEntity, ModelMetadata, CREATED_AT_COLUMN, DELETED_AT_COLUMN, DELETED_BY_USER_COLUMN,
    ID_COLUMN, IV_COLUMN, UPDATED_AT_COLUMN,
};
use models::permission::{does_permissions_intersect, intersecting_permissions, Permission, UserPermission};

use crate::errors::DatabaseError;
use crate::hooks::{DatabaseHooks, NoHooks};
use crate::query::{build_condition, column, json_to_value};
use crate::types::{
    CountBy, CreateBy, DatabaseCommonInteractionProps, DatabaseRequestType, DeleteBy, DeleteOneBy, FindBy, FindOneBy,
    FindOneById, Query, QueryValue, Record, SearchBy, SearchResult, Select, SortOrder, UpdateBy, UpdateById,
    UpdateOneBy, LIMIT_MAX,
};

/// Columns anyone may query or select, whatever the column ACLs say.
const ALWAYS_READABLE: [&str; 4] = [ID_COLUMN, CREATED_AT_COLUMN, UPDATED_AT_COLUMN, DELETED_AT_COLUMN];

/// Connection shared by every service. Cloning the handle shares the pool.
pub type DbHandle = Arc<DatabaseConnection>;

pub struct DatabaseService<E, H = NoHooks> {
    db: DbHandle,
    hooks: H,
    encryption: Encryption,
    secret: Arc<str>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, H: Clone> Clone for DatabaseService<E, H> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            hooks: self.hooks.clone(),
            encryption: self.encryption.clone(),
            secret: Arc::clone(&self.secret),
            _entity: PhantomData,
        }
    }
}

impl<E> DatabaseService<E, NoHooks>
where
    E: CrudEntity,
    E::Model: Sync,
{
    pub fn new(db: DbHandle, encryption_secret: &str) -> Self {
        Self::with_hooks(db, encryption_secret, NoHooks)
    }
}

impl<E, H> DatabaseService<E, H>
where
    E: CrudEntity,
    E::Model: Sync,
    H: DatabaseHooks<E>,
{
    /// `encryption_secret` keys both encrypted and hashed columns.
    pub fn with_hooks(db: DbHandle, encryption_secret: &str, hooks: H) -> Self {
        Self {
            db,
            hooks,
            encryption: Encryption::from_secret(encryption_secret),
            secret: Arc::from(encryption_secret),
            _entity: PhantomData,
        }
    }

    pub fn metadata(&self) -> &'static ModelMetadata {
        E::metadata()
    }

    fn table(&self) -> &'static str {
        E::metadata().table_name
    }

    pub fn connection(&self) -> Result<&DatabaseConnection, DatabaseError> {
        match self.db.as_ref() {
            DatabaseConnection::Disconnected => Err(DatabaseError::NotConnected),
            db => Ok(db),
        }
    }

    fn deny(&self, request: DatabaseRequestType, msg: String) -> DatabaseError {
        metrics::record_permission_denied(self.table(), &request.to_string());
        warn!(model = self.table(), op = %request, reason = %msg, "permission_denied");
        DatabaseError::NotAuthorized(msg)
    }

    // ---- data preparation -------------------------------------------------

    /// Every required column must carry a non-empty value unless it has a
    /// default. `false` satisfies a required boolean.
    pub fn check_required_fields(&self, data: &Record) -> Result<(), DatabaseError> {
        let meta = self.metadata();
        for name in meta.required_columns() {
            let present = match data.get(name) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(_) => true,
            };
            if !present && !meta.is_default_value_column(name) {
                return Err(DatabaseError::bad_data(format!("{} is required", name)));
            }
        }
        Ok(())
    }

    /// Text values may not exceed their column's length.
    pub fn check_max_lengths(&self, data: &Record) -> Result<(), DatabaseError> {
        for col in &self.metadata().columns {
            let (Some(max), Some(Value::String(text))) = (col.max_length, data.get(col.name)) else {
                continue;
            };
            if text.chars().count() > max {
                return Err(DatabaseError::bad_data(format!(
                    "{} cannot be more than {} characters.",
                    col.name, max
                )));
            }
        }
        Ok(())
    }

    fn fill_defaults(&self, data: &mut Record) {
        for col in &self.metadata().columns {
            if let Some(default) = &col.default_value {
                if data.get(col.name).map_or(true, Value::is_null) {
                    data.insert(col.name.to_owned(), default.clone());
                }
            }
        }
    }

    /// Encrypts every encrypted column under a fresh row iv, stored in `iv`.
    pub fn encrypt(&self, data: &mut Record) -> Result<(), DatabaseError> {
        if self.metadata().encrypted_columns().is_empty() {
            return Ok(());
        }
        let iv = Encryption::generate_iv();
        data.insert(IV_COLUMN.to_owned(), Value::String(iv.clone()));
        self.encrypt_with_iv(data, &iv)
    }

    fn encrypt_with_iv(&self, data: &mut Record, iv: &str) -> Result<(), DatabaseError> {
        for name in self.metadata().encrypted_columns() {
            match data.get_mut(name) {
                None | Some(Value::Null) => {}
                Some(Value::Object(members)) => {
                    for (member, value) in members.iter_mut() {
                        let plain = plain_text(value);
                        let key = format!("{}.{}", name, member);
                        *value = Value::String(self.encryption.encrypt(&key, &plain, iv)?);
                    }
                }
                Some(value) => {
                    let plain = plain_text(value);
                    *value = Value::String(self.encryption.encrypt(name, &plain, iv)?);
                }
            }
        }
        Ok(())
    }

    /// Reverses [`Self::encrypt`] using the record's own `iv`.
    pub fn decrypt(&self, data: &mut Record) -> Result<(), DatabaseError> {
        let Some(iv) = data.get(IV_COLUMN).and_then(Value::as_str).map(str::to_owned) else {
            return Ok(());
        };
        for name in self.metadata().encrypted_columns() {
            match data.get_mut(name) {
                Some(Value::String(cipher)) => {
                    *cipher = self.encryption.decrypt(name, cipher, &iv)?;
                }
                Some(Value::Object(members)) => {
                    for (member, value) in members.iter_mut() {
                        if let Value::String(cipher) = value {
                            let key = format!("{}.{}", name, member);
                            *cipher = self.encryption.decrypt(&key, cipher, &iv)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Hashes hashed columns that do not already hold a digest. The
    /// configured secret is the pepper.
    pub fn hash(&self, data: &mut Record) -> Result<(), DatabaseError> {
        for name in self.metadata().hashed_columns() {
            if let Some(Value::String(value)) = data.get_mut(name) {
                if !is_value_hashed(value) {
                    *value = hash_value(value, &self.secret)?;
                }
            }
        }
        Ok(())
    }

    /// Verifies a plain value against a stored hashed column value.
    pub fn matches_hashed(&self, plain: &str, stored: &str) -> bool {
        verify_hashed(plain, stored, &self.secret)
    }

    /// The slug is cut to the target column's length.
    pub fn generate_slug(&self, data: &mut Record) {
        let meta = self.metadata();
        if let Some((source, target)) = meta.slugify {
            if let Some(text) = data.get(source).and_then(Value::as_str) {
                let max_len = meta.column_meta(target).and_then(|c| c.max_length).unwrap_or(SLUG_MAX_LEN);
                let slug = get_slug(text, max_len);
                data.insert(target.to_owned(), Value::String(slug));
            }
        }
    }

    // ---- permissions ------------------------------------------------------

    /// Resolves the permissions a request acts with: project permissions for
    /// project requests, global permissions (plus `Public`) otherwise.
    pub fn get_permissions(
        &self,
        props: &DatabaseCommonInteractionProps,
        request: DatabaseRequestType,
    ) -> Result<Vec<UserPermission>, DatabaseError> {
        let meta = self.metadata();
        let Some(global) = &props.user_global_access_permission else {
            return Err(self.deny(request, "Permissions not found.".into()));
        };
        let model_permissions = meta.record_permissions(request);

        if !model_permissions.contains(&Permission::Public) && props.user_id.is_none() {
            return Err(self.deny(
                request,
                format!("A user should be logged in to {} record of type {}.", request, meta.singular_name),
            ));
        }

        let mut global_permissions = global.global_permissions.clone();
        if !global_permissions.contains(&Permission::Public) {
            global_permissions.push(Permission::Public);
        }

        let user_permissions = match (props.project_id, &props.user_project_access_permission) {
            (None, _) => global_permissions.into_iter().map(UserPermission::unlabeled).collect(),
            (Some(_), Some(project)) => project.permissions.clone(),
            (Some(_), None) => return Err(self.deny(request, "Permissions not found.".into())),
        };

        if let Some(project) = &props.user_project_access_permission {
            if !does_permissions_intersect(&project.permission_list(), model_permissions) {
                return Err(self.deny(
                    request,
                    format!("A user does not have permissions to {} record of type {}.", request, meta.singular_name),
                ));
            }
        }

        Ok(user_permissions)
    }

    fn columns_by_permissions(
        &self,
        user_permissions: &[UserPermission],
        pick: impl Fn(&ColumnAccessControl) -> &Vec<Permission>,
    ) -> Vec<&'static str> {
        let permissions: Vec<Permission> = user_permissions.iter().map(|p| p.permission).collect();
        self.metadata()
            .column_access_control_for_all_columns()
            .into_iter()
            .filter(|(_, acl)| does_permissions_intersect(&permissions, pick(acl)))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn get_createable_columns_by_permissions(&self, user_permissions: &[UserPermission]) -> Vec<&'static str> {
        self.columns_by_permissions(user_permissions, |acl| &acl.create)
    }

    pub fn get_read_columns_by_permissions(&self, user_permissions: &[UserPermission]) -> Vec<&'static str> {
        self.columns_by_permissions(user_permissions, |acl| &acl.read)
    }

    pub fn get_update_columns_by_permissions(&self, user_permissions: &[UserPermission]) -> Vec<&'static str> {
        self.columns_by_permissions(user_permissions, |acl| &acl.update)
    }

    /// Keeps only the columns the caller may set on create.
    pub fn as_createable_by_permissions(&self, mut create_by: CreateBy) -> Result<CreateBy, DatabaseError> {
        if create_by.props.is_root {
            return Ok(create_by);
        }
        let permissions = self.get_permissions(&create_by.props, DatabaseRequestType::Create)?;
        let allowed = self.get_createable_columns_by_permissions(&permissions);
        create_by.data.retain(|key, _| {
            let keep = allowed.contains(&key.as_str());
            if !keep {
                debug!(model = self.table(), column = %key, "dropping non-creatable column");
            }
            keep
        });
        Ok(create_by)
    }

    /// Restricts the query to the caller's projects. A constraint the query
    /// already puts on the project column is kept as long as it stays inside
    /// those projects; on `project` itself that column is the requested id.
    fn scope_to_tenant(
        &self,
        query: &mut Query,
        props: &DatabaseCommonInteractionProps,
        request: DatabaseRequestType,
    ) -> Result<(), DatabaseError> {
        let Some(project_column) = self.metadata().project_column else {
            return Ok(());
        };
        let allowed: Vec<Uuid> = if let Some(project_id) = props.project_id {
            vec![project_id]
        } else if let Some(global) = &props.user_global_access_permission {
            global.project_ids.clone()
        } else {
            return Err(self.deny(request, format!("Not enough permissions to {} the record", request)));
        };
        let in_allowed = |value: &Value| {
            value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .is_some_and(|id| allowed.contains(&id))
        };

        let scoped = match query.get(project_column) {
            None => match props.project_id {
                Some(project_id) => QueryValue::from(project_id),
                None => QueryValue::In(allowed.iter().map(|id| Value::String(id.to_string())).collect()),
            },
            Some(QueryValue::Eq(value)) if in_allowed(value) => return Ok(()),
            Some(QueryValue::In(values)) => {
                QueryValue::In(values.iter().filter(|v| in_allowed(v)).cloned().collect())
            }
            Some(_) => {
                return Err(self.deny(
                    request,
                    format!("Not enough permissions to {} the record", request),
                ))
            }
        };
        query.insert(project_column, scoped);
        Ok(())
    }

    /// Limits the request to rows owned by the caller when the only table
    /// permission it holds is `CurrentUser`.
    fn scope_to_owner(
        &self,
        query: &mut Query,
        props: &DatabaseCommonInteractionProps,
        permissions: &[Permission],
        request: DatabaseRequestType,
    ) {
        let meta = self.metadata();
        let table_permissions = meta.record_permissions(request);
        let granted: Vec<Permission> = intersecting_permissions(permissions, table_permissions)
            .into_iter()
            .filter(|p| !matches!(p, Permission::CurrentUser | Permission::Public))
            .collect();
        if let (Some(user_column), Some(user_id)) = (meta.user_column, props.user_id) {
            if granted.is_empty() && table_permissions.contains(&Permission::CurrentUser) {
                query.insert(user_column, user_id);
            }
        }
    }

    fn apply_permission_if(&self, query: &mut Query, permissions: &[Permission]) {
        for rule in &self.metadata().is_permission_if {
            if permissions.contains(&rule.permission) {
                query.insert(rule.column, QueryValue::Eq(rule.value.clone()));
            }
        }
    }

    pub fn as_find_by_permissions(&self, mut find_by: FindBy) -> Result<FindBy, DatabaseError> {
        if find_by.props.is_root {
            return Ok(find_by);
        }
        let request = DatabaseRequestType::Read;
        let user_permissions = self.get_permissions(&find_by.props, request)?;
        let permissions: Vec<Permission> = user_permissions.iter().map(|p| p.permission).collect();
        let readable = self.get_read_columns_by_permissions(&user_permissions);
        let can_read = |name: &str| ALWAYS_READABLE.contains(&name) || readable.contains(&name);

        for name in find_by.query.columns() {
            if !can_read(name) {
                return Err(self.deny(request, format!("A user does not have permissions to query on - {}.", name)));
            }
        }
        for name in &find_by.select {
            if !can_read(name) {
                return Err(self.deny(request, format!("A user does not have permissions to select on - {}.", name)));
            }
        }
        for name in &find_by.populate {
            let relation_column = self.metadata().relation_meta(name).map(|r| r.column);
            if let Some(relation_column) = relation_column {
                if !can_read(relation_column) {
                    return Err(self.deny(request, format!("A user does not have permissions to populate - {}.", name)));
                }
            }
        }
        if find_by.select.is_empty() {
            find_by.select = readable.iter().map(|c| c.to_string()).collect();
        }

        self.scope_to_tenant(&mut find_by.query, &find_by.props, request)?;
        self.scope_to_owner(&mut find_by.query, &find_by.props, &permissions, request);
        self.apply_permission_if(&mut find_by.query, &permissions);
        Ok(find_by)
    }

    pub fn as_update_by_permissions(&self, mut update_by: UpdateBy) -> Result<UpdateBy, DatabaseError> {
        if update_by.props.is_root {
            return Ok(update_by);
        }
        let request = DatabaseRequestType::Update;
        let user_permissions = self.get_permissions(&update_by.props, request)?;
        let permissions: Vec<Permission> = user_permissions.iter().map(|p| p.permission).collect();
        let updatable = self.get_update_columns_by_permissions(&user_permissions);
        let readable = self.get_read_columns_by_permissions(&user_permissions);

        for name in update_by.query.columns() {
            if !ALWAYS_READABLE.contains(&name) && !readable.contains(&name) {
                return Err(self.deny(request, format!("A user does not have permissions to query on - {}.", name)));
            }
        }
        for name in update_by.data.keys() {
            if !updatable.contains(&name.as_str()) {
                return Err(self.deny(
                    request,
                    format!("A user does not have permissions to update this record at - {}.", name),
                ));
            }
        }

        self.scope_to_tenant(&mut update_by.query, &update_by.props, request)?;
        if let (Some(user_column), Some(user_id)) = (self.metadata().user_column, update_by.props.user_id) {
            update_by.query.insert(user_column, user_id);
        }
        self.apply_permission_if(&mut update_by.query, &permissions);
        Ok(update_by)
    }

    pub fn as_delete_by_permissions(&self, mut delete_by: DeleteBy) -> Result<DeleteBy, DatabaseError> {
        if delete_by.props.is_root {
            return Ok(delete_by);
        }
        let request = DatabaseRequestType::Delete;
        let user_permissions = self.get_permissions(&delete_by.props, request)?;
        let permissions: Vec<Permission> = user_permissions.iter().map(|p| p.permission).collect();
        self.scope_to_tenant(&mut delete_by.query, &delete_by.props, request)?;
        self.scope_to_owner(&mut delete_by.query, &delete_by.props, &permissions, request);
        Ok(delete_by)
    }

    fn exclude_soft_deleted(&self, query: &mut Query) {
        if self.metadata().is_soft_deletable() && !query.contains(DELETED_AT_COLUMN) {
            query.insert(DELETED_AT_COLUMN, QueryValue::IsNull);
        }
    }

    // ---- create -----------------------------------------------------------

    /// `current` is the row being updated, which may keep its own value.
    async fn check_unique_columns_by(&self, data: &Record, current: Option<Uuid>) -> Result<(), DatabaseError> {
        let meta = self.metadata();
        for (name, scope) in &meta.unique_columns_by {
            let Some(value) = data.get(*name).and_then(Value::as_str) else {
                continue;
            };
            let scope_value = match data.get(*scope) {
                None | Some(Value::Null) => QueryValue::IsNull,
                Some(v) => QueryValue::Eq(v.clone()),
            };
            let query = Query::new()
                .with(*name, QueryValue::SameName(value.to_owned()))
                .with(*scope, scope_value);
            let taken = match current {
                None => {
                    self.count_by(CountBy { query, props: DatabaseCommonInteractionProps::root(), ..Default::default() })
                        .await?
                        > 0
                }
                Some(id) => {
                    let id = id.to_string();
                    self.find_by(FindBy {
                        query,
                        select: Select::from([ID_COLUMN.to_owned()]),
                        limit: 2,
                        props: DatabaseCommonInteractionProps::root(),
                        ..Default::default()
                    })
                    .await?
                    .iter()
                    .any(|row| row.get(ID_COLUMN).and_then(Value::as_str) != Some(id.as_str()))
                }
            };
            if taken {
                return Err(self.duplicate(name));
            }
        }
        Ok(())
    }

    fn duplicate(&self, column: &str) -> DatabaseError {
        DatabaseError::bad_data(format!("{} with the same {} already exists.", self.metadata().singular_name, column))
    }

    async fn insert_record(&self, db: &DatabaseConnection, data: &Record) -> Result<Record, DatabaseError> {
        let mut columns = Vec::with_capacity(data.len());
        let mut values: Vec<SimpleExpr> = Vec::with_capacity(data.len());
        for (name, value) in data {
            let col = column::<E>(name)?;
            values.push(json_to_value(col, value)?.into());
            columns.push(col);
        }
        let mut insert = SeaQuery::insert();
        insert
            .into_table(E::default())
            .columns(columns)
            .values(values)
            .map_err(|e| DatabaseError::bad_data(e.to_string()))?
            .returning_all();
        let stmt = db.get_database_backend().build(&insert);
        let row = JsonValue::find_by_statement(stmt)
            .one(db)
            .await?
            .ok_or_else(|| DatabaseError::Db(format!("insert into {} returned no row", self.table())))?;
        match row {
            Value::Object(record) => Ok(record),
            other => Err(DatabaseError::Db(format!("unexpected insert result: {}", other))),
        }
    }

    #[instrument(skip_all, fields(model = E::metadata().table_name))]
    pub async fn create(&self, create_by: CreateBy) -> Result<Record, DatabaseError> {
        let result = self.create_inner(create_by).await;
        if let Err(e) = &result {
            warn!(model = self.table(), error = %e, kind = e.kind(), "create_failed");
            self.hooks.on_create_error(e).await;
        }
        metrics::record_db_operation(self.table(), "create", result.is_ok());
        result
    }

    async fn create_inner(&self, create_by: CreateBy) -> Result<Record, DatabaseError> {
        let db = self.connection()?;
        let meta = self.metadata();

        let mut create_by = self.as_createable_by_permissions(create_by)?;
        if let (Some(project_column), Some(project_id)) = (meta.project_column, create_by.props.project_id) {
            if project_column != ID_COLUMN {
                create_by.data.insert(project_column.to_owned(), Value::String(project_id.to_string()));
            }
        }
        let mut create_by = self.hooks.on_before_create(create_by).await?;

        let data = &mut create_by.data;
        self.generate_slug(data);
        self.fill_defaults(data);
        self.check_required_fields(data)?;
        self.check_max_lengths(data)?;
        self.encrypt(data)?;
        self.hash(data)?;
        self.check_unique_columns_by(data, None).await?;

        let now = Value::String(Utc::now().to_rfc3339());
        if data.get(ID_COLUMN).map_or(true, Value::is_null) {
            data.insert(ID_COLUMN.to_owned(), Value::String(Uuid::new_v4().to_string()));
        }
        for stamp in [CREATED_AT_COLUMN, UPDATED_AT_COLUMN] {
            if meta.has_column(stamp) {
                data.insert(stamp.to_owned(), now.clone());
            }
        }

        let mut created = self.insert_record(db, &create_by.data).await?;
        self.decrypt(&mut created)?;
        created.remove(IV_COLUMN);
        let created = self.hooks.on_create_success(&create_by, created).await?;
        let id = created.get(ID_COLUMN).and_then(serde_json::Value::as_str).unwrap_or_default();
        info!(model = self.table(), id, "record_created");
        Ok(created)
    }

    // ---- read -------------------------------------------------------------

    #[instrument(skip_all, fields(model = E::metadata().table_name))]
    pub async fn count_by(&self, count_by: CountBy) -> Result<u64, DatabaseError> {
        let result = self.count_inner(count_by).await;
        match &result {
            Ok(count) => debug!(model = self.table(), count, "records_counted"),
            Err(e) => self.hooks.on_count_error(e).await,
        }
        metrics::record_db_operation(self.table(), "count", result.is_ok());
        result
    }

    async fn count_inner(&self, count_by: CountBy) -> Result<u64, DatabaseError> {
        let db = self.connection()?;
        let CountBy { query, skip, limit, props } = count_by;
        let mut query = if props.is_root {
            query
        } else {
            self.as_find_by_permissions(FindBy { query, props, ..Default::default() })?.query
        };
        self.exclude_soft_deleted(&mut query);
        let cond = build_condition::<E>(&query)?;
        let total = E::find().filter(cond).count(db).await?;
        let mut count = total.saturating_sub(skip.unwrap_or(0));
        if let Some(limit) = limit {
            count = count.min(limit);
        }
        self.hooks.on_count_success(count).await
    }

    #[instrument(skip_all, fields(model = E::metadata().table_name))]
    pub async fn find_by(&self, find_by: FindBy) -> Result<Vec<Record>, DatabaseError> {
        let result = self.find_inner(find_by).await;
        if let Err(e) = &result {
            self.hooks.on_find_error(e).await;
        }
        metrics::record_db_operation(self.table(), "find", result.is_ok());
        result
    }

    async fn find_inner(&self, mut find_by: FindBy) -> Result<Vec<Record>, DatabaseError> {
        let db = self.connection()?;
        let meta = self.metadata();

        if find_by.sort.is_empty() {
            find_by.sort.insert(CREATED_AT_COLUMN.to_owned(), SortOrder::Descending);
        }
        let find_by = self.hooks.on_before_find(find_by).await?;
        let mut find_by = self.as_find_by_permissions(find_by)?;

        if find_by.select.is_empty() && find_by.props.is_root {
            find_by.select = meta.column_names().filter(|c| *c != IV_COLUMN).map(str::to_owned).collect();
        }
        find_by.select.insert(ID_COLUMN.to_owned());
        find_by.select.insert(CREATED_AT_COLUMN.to_owned());
        self.exclude_soft_deleted(&mut find_by.query);

        let mut fetched: BTreeSet<&str> = find_by.select.iter().map(String::as_str).collect();
        for name in &find_by.populate {
            let relation = meta
                .relation_meta(name)
                .ok_or_else(|| DatabaseError::bad_data(format!("{} is not a relation of {}", name, meta.singular_name)))?;
            fetched.insert(relation.column);
        }
        if meta.encrypted_columns().iter().any(|c| fetched.contains(c)) {
            fetched.insert(IV_COLUMN);
        }

        let mut select = E::find().select_only();
        for name in &fetched {
            select = select.column(column::<E>(name)?);
        }
        select = select.filter(build_condition::<E>(&find_by.query)?);
        for (name, order) in &find_by.sort {
            let order = match order {
                SortOrder::Ascending => Order::Asc,
                SortOrder::Descending => Order::Desc,
            };
            select = select.order_by(column::<E>(name)?, order);
        }
        // zero means no explicit page size
        let limit = if find_by.limit == 0 { LIMIT_MAX } else { find_by.limit.min(LIMIT_MAX) };
        let rows = select
            .offset(find_by.skip)
            .limit(limit)
            .into_json()
            .all(db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            if let Value::Object(mut record) = row {
                self.decrypt(&mut record)?;
                items.push(record);
            }
        }
        self.populate(db, &mut items, &find_by.populate).await?;
        for item in &mut items {
            item.retain(|key, _| find_by.select.contains(key) || find_by.populate.contains(key));
        }

        let items = self.hooks.on_find_success(items).await?;
        debug!(model = self.table(), count = items.len(), "records_found");
        Ok(items)
    }

    /// Adds each requested relation as a nested object (or `null`) next to
    /// its foreign-key column.
    async fn populate(
        &self,
        db: &DatabaseConnection,
        items: &mut [Record],
        populate: &Select,
    ) -> Result<(), DatabaseError> {
        let meta = self.metadata();
        for name in populate {
            let Some(relation) = meta.relation_meta(name) else { continue };
            let ids: BTreeSet<Uuid> = items
                .iter()
                .filter_map(|r| r.get(relation.column).and_then(Value::as_str))
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect();
            let mut related: HashMap<String, Value> = HashMap::new();
            if !ids.is_empty() {
                let mut q = SeaQuery::select();
                q.from(Alias::new(relation.table));
                for col in &relation.select {
                    q.column(Alias::new(*col));
                }
                q.and_where(Expr::col(Alias::new(ID_COLUMN)).is_in(ids.iter().map(|id| SeaValue::from(*id))));
                let stmt = db.get_database_backend().build(&q);
                for row in JsonValue::find_by_statement(stmt).all(db).await? {
                    if let Some(id) = row.get(ID_COLUMN).and_then(Value::as_str) {
                        related.insert(id.to_owned(), row.clone());
                    }
                }
            }
            for item in items.iter_mut() {
                let value = item
                    .get(relation.column)
                    .and_then(Value::as_str)
                    .and_then(|id| related.get(id))
                    .cloned()
                    .unwrap_or(Value::Null);
                item.insert(relation.name.to_owned(), value);
            }
        }
        Ok(())
    }

    pub async fn find_one_by(&self, find_one_by: FindOneBy) -> Result<Option<Record>, DatabaseError> {
        let FindOneBy { query, select, sort, populate, props } = find_one_by;
        let items = self
            .find_by(FindBy { query, select, sort, populate, skip: 0, limit: 1, props })
            .await?;
        Ok(items.into_iter().next())
    }

    pub async fn find_one_by_id(&self, find_one_by_id: FindOneById) -> Result<Option<Record>, DatabaseError> {
        let FindOneById { id, select, populate, props } = find_one_by_id;
        self.find_one_by(FindOneBy { query: Query::by_id(id), select, populate, props, ..Default::default() })
            .await
    }

    #[instrument(skip_all, fields(model = E::metadata().table_name))]
    pub async fn search_by(&self, search_by: SearchBy) -> Result<SearchResult, DatabaseError> {
        let SearchBy { query, select, sort, populate, skip, limit, props } = search_by;
        let find = self.find_by(FindBy {
            query: query.clone(),
            select,
            sort,
            populate,
            skip,
            limit,
            props: props.clone(),
        });
        let count = self.count_by(CountBy { query, props, ..Default::default() });
        let (items, count) = tokio::try_join!(find, count)?;
        Ok(SearchResult { items, count })
    }

    // ---- update -----------------------------------------------------------

    #[instrument(skip_all, fields(model = E::metadata().table_name))]
    pub async fn update_by(&self, update_by: UpdateBy) -> Result<u64, DatabaseError> {
        let result = self.update_inner(update_by).await;
        if let Err(e) = &result {
            warn!(model = self.table(), error = %e, kind = e.kind(), "update_failed");
            self.hooks.on_update_error(e).await;
        }
        metrics::record_db_operation(self.table(), "update", result.is_ok());
        result
    }

    pub async fn update_one_by(&self, update_one_by: UpdateOneBy) -> Result<u64, DatabaseError> {
        self.update_by(update_one_by).await
    }

    pub async fn update_one_by_id(&self, update_by_id: UpdateById) -> Result<u64, DatabaseError> {
        let UpdateById { id, data, props } = update_by_id;
        self.update_one_by(UpdateBy { query: Query::by_id(id), data, props }).await
    }

    pub async fn update_one_by_id_and_fetch(&self, update_by_id: UpdateById) -> Result<Option<Record>, DatabaseError> {
        let id = update_by_id.id;
        let props = update_by_id.props.clone();
        self.update_one_by_id(update_by_id).await?;
        self.find_one_by_id(FindOneById { id, props, ..Default::default() }).await
    }

    async fn load_ivs(&self, db: &DatabaseConnection, ids: &[Uuid]) -> Result<HashMap<Uuid, String>, DatabaseError> {
        let pk = column::<E>(ID_COLUMN)?;
        let rows = E::find()
            .select_only()
            .column(pk)
            .column(column::<E>(IV_COLUMN)?)
            .filter(build_condition::<E>(&Query::new().with(
                ID_COLUMN,
                QueryValue::In(ids.iter().map(|id| Value::String(id.to_string())).collect()),
            ))?)
            .into_json()
            .all(db)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let id = row.get(ID_COLUMN).and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())?;
                let iv = row.get(IV_COLUMN).and_then(Value::as_str)?;
                Some((id, iv.to_owned()))
            })
            .collect())
    }

    /// Renames must stay unique within each row's scope, also among the
    /// rows updated together.
    async fn check_unique_on_update(&self, data: &Record, ids: &[Uuid]) -> Result<(), DatabaseError> {
        let meta = self.metadata();
        let scopes: Select = meta
            .unique_columns_by
            .iter()
            .filter(|(name, _)| data.get(*name).is_some_and(Value::is_string))
            .map(|(_, scope)| scope.to_string())
            .collect();
        if scopes.is_empty() || ids.is_empty() {
            return Ok(());
        }
        let rows = self
            .find_by(FindBy {
                query: Query::new().with(
                    ID_COLUMN,
                    QueryValue::In(ids.iter().map(|id| Value::String(id.to_string())).collect()),
                ),
                select: scopes.clone(),
                limit: LIMIT_MAX,
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await?;

        let mut seen: BTreeSet<String> = BTreeSet::new();
        for row in rows {
            let Some(id) = row.get(ID_COLUMN).and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok()) else {
                continue;
            };
            let mut candidate = data.clone();
            for scope in &scopes {
                let value = row.get(scope).cloned().unwrap_or(Value::Null);
                if !seen.insert(format!("{}={}", scope, value)) {
                    if let Some((name, _)) = meta.unique_columns_by.iter().find(|(_, s)| *s == scope.as_str()) {
                        return Err(self.duplicate(name));
                    }
                }
                candidate.insert(scope.clone(), value);
            }
            self.check_unique_columns_by(&candidate, Some(id)).await?;
        }
        Ok(())
    }

    async fn update_inner(&self, update_by: UpdateBy) -> Result<u64, DatabaseError> {
        let db = self.connection()?;
        let meta = self.metadata();

        let update_by = self.hooks.on_before_update(update_by).await?;
        let mut update_by = self.as_update_by_permissions(update_by)?;

        // rows are matched through the permissioned read path
        let matched = self
            .find_by(FindBy {
                query: update_by.query.clone(),
                select: Select::from([ID_COLUMN.to_owned()]),
                limit: LIMIT_MAX,
                props: update_by.props.clone(),
                ..Default::default()
            })
            .await?;
        let ids: Vec<Uuid> = matched
            .iter()
            .filter_map(|r| r.get(ID_COLUMN).and_then(Value::as_str))
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect();

        self.check_max_lengths(&update_by.data)?;
        self.check_unique_on_update(&update_by.data, &ids).await?;
        self.hash(&mut update_by.data)?;
        let touches_encrypted = meta.encrypted_columns().iter().any(|c| update_by.data.contains_key(*c));
        let ivs = if touches_encrypted && !ids.is_empty() {
            self.load_ivs(db, &ids).await?
        } else {
            HashMap::new()
        };

        let now = Value::String(Utc::now().to_rfc3339());
        for id in &ids {
            let mut data = update_by.data.clone();
            if touches_encrypted {
                let iv = match ivs.get(id) {
                    Some(iv) => iv.clone(),
                    None => {
                        let iv = Encryption::generate_iv();
                        data.insert(IV_COLUMN.to_owned(), Value::String(iv.clone()));
                        iv
                    }
                };
                self.encrypt_with_iv(&mut data, &iv)?;
            }
            if meta.has_column(UPDATED_AT_COLUMN) {
                data.insert(UPDATED_AT_COLUMN.to_owned(), now.clone());
            }
            let mut update = E::update_many();
            for (name, value) in &data {
                let col = column::<E>(name)?;
                update = update.col_expr(col, Expr::value(json_to_value(col, value)?));
            }
            update.filter(build_condition::<E>(&Query::by_id(*id))?).exec(db).await?;
        }

        let affected = ids.len() as u64;
        self.hooks.on_update_success(&update_by, affected).await?;
        info!(model = self.table(), affected, "records_updated");
        Ok(affected)
    }

    // ---- delete -----------------------------------------------------------

    #[instrument(skip_all, fields(model = E::metadata().table_name))]
    pub async fn delete_by(&self, delete_by: DeleteBy) -> Result<u64, DatabaseError> {
        let result = self.delete_inner(delete_by).await;
        if let Err(e) = &result {
            warn!(model = self.table(), error = %e, kind = e.kind(), "delete_failed");
            self.hooks.on_delete_error(e).await;
        }
        metrics::record_db_operation(self.table(), "delete", result.is_ok());
        result
    }

    pub async fn delete_one_by(&self, delete_one_by: DeleteOneBy) -> Result<u64, DatabaseError> {
        self.delete_by(delete_one_by).await
    }

    async fn delete_inner(&self, delete_by: DeleteBy) -> Result<u64, DatabaseError> {
        let db = self.connection()?;
        let meta = self.metadata();

        let delete_by = self.hooks.on_before_delete(delete_by).await?;
        let mut delete_by = self.as_delete_by_permissions(delete_by)?;
        self.exclude_soft_deleted(&mut delete_by.query);
        let cond = build_condition::<E>(&delete_by.query)?;

        let affected = if meta.is_soft_deletable() {
            let now: DateTime<FixedOffset> = Utc::now().into();
            let mut update = E::update_many().col_expr(column::<E>(DELETED_AT_COLUMN)?, Expr::value(now));
            if meta.has_column(DELETED_BY_USER_COLUMN) {
                update = update.col_expr(column::<E>(DELETED_BY_USER_COLUMN)?, Expr::value(delete_by.props.user_id));
            }
            update.filter(cond).exec(db).await?.rows_affected
        } else {
            E::delete_many().filter(cond).exec(db).await?.rows_affected
        };

        self.hooks.on_delete_success(&delete_by, affected).await?;
        info!(model = self.table(), affected, soft = meta.is_soft_deletable(), "records_deleted");
        Ok(affected)
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use models::permission::{UserGlobalAccessPermission, UserProjectAccessPermission};
    use models::{api_key, monitor, project};
    use sea_orm::{DatabaseBackend, MockDatabase, MockDatabaseTrait, MockExecResult, Transaction};
    use serde_json::json;

    use super::*;

    const SECRET: &str = "test-secret";

    /// Rows whose visibility depends on the caller's project role.
    mod incident {
        use std::sync::OnceLock;

        use models::metadata::{CrudEntity, ModelMetadata, TableAccessControl, TableColumn, TableColumnType};
        use models::permission::Permission;
        use sea_orm::entity::prelude::*;
        use serde_json::json;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
        #[sea_orm(table_name = "incident")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: Uuid,
            pub project_id: Uuid,
            pub title: String,
            pub is_public: bool,
            pub created_at: DateTimeWithTimeZone,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}

        impl CrudEntity for Entity {
            fn metadata() -> &'static ModelMetadata {
                static METADATA: OnceLock<ModelMetadata> = OnceLock::new();
                METADATA.get_or_init(|| {
                    use Permission::*;
                    let read = [ProjectOwner, ProjectMember];
                    ModelMetadata::new("incident", "Incident", "Incidents")
                        .base_columns()
                        .project_column("project_id")
                        .permission_if(ProjectMember, "is_public", json!(true))
                        .table_access(TableAccessControl {
                            create: vec![ProjectOwner],
                            read: read.to_vec(),
                            update: vec![ProjectOwner],
                            delete: vec![ProjectOwner],
                        })
                        .column(TableColumn::new("project_id", TableColumnType::Entity).access(&[ProjectOwner], &read, &[]))
                        .column(TableColumn::new("title", TableColumnType::ShortText).access(&[ProjectOwner], &read, &[ProjectOwner]))
                        .column(TableColumn::new("is_public", TableColumnType::Boolean).access(&[ProjectOwner], &read, &[ProjectOwner]))
                })
            }
        }
    }

    fn member_props(project_id: Uuid, permissions: &[Permission]) -> DatabaseCommonInteractionProps {
        DatabaseCommonInteractionProps {
            user_id: Some(Uuid::new_v4()),
            project_id: Some(project_id),
            is_root: false,
            user_global_access_permission: Some(UserGlobalAccessPermission {
                project_ids: vec![project_id],
                global_permissions: vec![Permission::Public, Permission::User, Permission::CurrentUser],
            }),
            user_project_access_permission: Some(UserProjectAccessPermission {
                project_id,
                permissions: permissions.iter().copied().map(UserPermission::unlabeled).collect(),
            }),
        }
    }

    /// A signed-in user with no project header, belonging to `project_ids`.
    fn user_props(project_ids: Vec<Uuid>) -> DatabaseCommonInteractionProps {
        DatabaseCommonInteractionProps {
            user_id: Some(Uuid::new_v4()),
            user_global_access_permission: Some(UserGlobalAccessPermission {
                project_ids,
                global_permissions: vec![Permission::Public, Permission::User, Permission::CurrentUser],
            }),
            ..Default::default()
        }
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    fn mock(db: MockDatabase) -> DbHandle {
        Arc::new(db.into_connection())
    }

    fn disconnected() -> DbHandle {
        Arc::new(DatabaseConnection::Disconnected)
    }

    fn count_row(n: i64) -> BTreeMap<&'static str, SeaValue> {
        BTreeMap::from([("num_items", SeaValue::BigInt(Some(n)))])
    }

    fn monitor_row(project_id: Uuid, name: &str) -> monitor::Model {
        let now = Utc::now().into();
        monitor::Model {
            id: Uuid::new_v4(),
            project_id,
            name: name.to_owned(),
            description: None,
            slug: get_slug(name, SLUG_MAX_LEN),
            created_by_user_id: None,
            deleted_by_user_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn api_key_row(project_id: Uuid) -> api_key::Model {
        let now = Utc::now().into();
        api_key::Model {
            id: Uuid::new_v4(),
            project_id,
            name: "ci".into(),
            description: None,
            expires_at: now,
            api_key: "stored".into(),
            iv: None,
            created_by_user_id: None,
            deleted_by_user_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn id_row(id: Uuid) -> BTreeMap<&'static str, SeaValue> {
        BTreeMap::from([("id", SeaValue::from(id))])
    }

    fn exec_ok(rows_affected: u64) -> MockExecResult {
        MockExecResult { last_insert_id: 0, rows_affected }
    }

    /// Statements the mock has seen so far, rendered as SQL.
    fn logged_sql(db: &DbHandle) -> Vec<String> {
        let mut mocker = match db.as_mock_connection().get_mocker_mutex().lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        mocker.drain_transaction_log().iter().map(Transaction::to_string).collect()
    }

    #[tokio::test]
    async fn missing_permissions_rejected_before_database() {
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres));
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);

        let props = DatabaseCommonInteractionProps { user_id: Some(Uuid::new_v4()), ..Default::default() };
        let err = svc.find_by(FindBy { props, ..Default::default() }).await.unwrap_err();
        assert_eq!(err, DatabaseError::NotAuthorized("Permissions not found.".into()));

        let project_id = Uuid::new_v4();
        let mut anonymous = member_props(project_id, &[Permission::ProjectMember]);
        anonymous.user_id = None;
        let err = svc.count_by(CountBy { props: anonymous, ..Default::default() }).await.unwrap_err();
        assert_eq!(
            err,
            DatabaseError::NotAuthorized("A user should be logged in to read record of type Monitor.".into())
        );

        let outsider = member_props(project_id, &[Permission::CanReadProjectApiKey]);
        let err = svc.delete_by(DeleteBy { props: outsider, ..Default::default() }).await.unwrap_err();
        assert_eq!(
            err,
            DatabaseError::NotAuthorized("A user does not have permissions to delete record of type Monitor.".into())
        );

        assert!(logged_sql(&db).is_empty());
    }

    #[tokio::test]
    async fn unreadable_query_and_select_columns_rejected() {
        let project_id = Uuid::new_v4();
        let svc = DatabaseService::<monitor::Entity>::new(mock(MockDatabase::new(DatabaseBackend::Postgres)), SECRET);
        let props = member_props(project_id, &[Permission::CanReadProjectMonitor]);

        let err = svc
            .find_by(FindBy {
                query: Query::new().with("deleted_by_user_id", Uuid::new_v4()),
                props: props.clone(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DatabaseError::NotAuthorized("A user does not have permissions to query on - deleted_by_user_id.".into())
        );

        let err = svc
            .find_by(FindBy {
                select: Select::from(["deleted_by_user_id".to_owned()]),
                props,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DatabaseError::NotAuthorized("A user does not have permissions to select on - deleted_by_user_id.".into())
        );
    }

    #[test]
    fn find_is_scoped_to_tenant_and_fills_select() {
        let project_id = Uuid::new_v4();
        let svc = DatabaseService::<monitor::Entity>::new(disconnected(), SECRET);
        let find_by = svc
            .as_find_by_permissions(FindBy {
                props: member_props(project_id, &[Permission::ProjectMember]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(find_by.query.get("project_id"), Some(&QueryValue::from(project_id)));
        assert!(find_by.select.contains("name"));
        assert!(find_by.select.contains("deleted_by_user_id"));

        // without a project, reads span every project the user belongs to
        let find_by = svc.as_find_by_permissions(FindBy { props: user_props(vec![project_id]), ..Default::default() }).unwrap();
        assert_eq!(
            find_by.query.get("project_id"),
            Some(&QueryValue::In(vec![json!(project_id.to_string())]))
        );
        assert!(find_by.select.is_empty());
    }

    #[test]
    fn project_header_does_not_widen_access_to_other_projects() {
        let (own, other) = (Uuid::new_v4(), Uuid::new_v4());
        let svc = DatabaseService::<project::Entity>::new(disconnected(), SECRET);
        let owner = member_props(own, &[Permission::ProjectOwner]);

        let err = svc
            .as_delete_by_permissions(DeleteBy { query: Query::by_id(other), props: owner.clone() })
            .unwrap_err();
        assert_eq!(err, DatabaseError::NotAuthorized("Not enough permissions to delete the record".into()));

        let err = svc
            .as_update_by_permissions(UpdateBy {
                query: Query::by_id(other),
                data: record(json!({"name": "Taken over"})),
                props: owner.clone(),
            })
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotAuthorized(_)));

        let delete_by = svc.as_delete_by_permissions(DeleteBy { query: Query::by_id(own), props: owner }).unwrap();
        assert_eq!(delete_by.query.get("id"), Some(&QueryValue::from(own)));
    }

    #[test]
    fn requested_project_ids_stay_inside_membership() {
        let (a, b, outside) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let svc = DatabaseService::<project::Entity>::new(disconnected(), SECRET);

        let find_by = svc
            .as_find_by_permissions(FindBy { query: Query::by_id(b), props: user_props(vec![a, b]), ..Default::default() })
            .unwrap();
        assert_eq!(find_by.query.get("id"), Some(&QueryValue::from(b)));

        let err = svc
            .as_find_by_permissions(FindBy {
                query: Query::by_id(outside),
                props: user_props(vec![a, b]),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotAuthorized(_)));

        let wanted = QueryValue::In(vec![json!(a.to_string()), json!(outside.to_string())]);
        let find_by = svc
            .as_find_by_permissions(FindBy {
                query: Query::new().with("id", wanted),
                props: user_props(vec![a, b]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(find_by.query.get("id"), Some(&QueryValue::In(vec![json!(a.to_string())])));

        let err = svc
            .as_find_by_permissions(FindBy {
                query: Query::new().with("id", QueryValue::NotNull),
                props: user_props(vec![a]),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotAuthorized(_)));
    }

    #[test]
    fn update_requires_updatable_columns() {
        let project_id = Uuid::new_v4();
        let svc = DatabaseService::<monitor::Entity>::new(disconnected(), SECRET);
        let props = member_props(project_id, &[Permission::CanEditProjectMonitor, Permission::CanReadProjectMonitor]);

        let ok = svc
            .as_update_by_permissions(UpdateBy {
                query: Query::by_id(Uuid::new_v4()),
                data: record(json!({"name": "renamed"})),
                props: props.clone(),
            })
            .unwrap();
        assert_eq!(ok.query.get("project_id"), Some(&QueryValue::from(project_id)));

        let err = svc
            .as_update_by_permissions(UpdateBy {
                query: Query::by_id(Uuid::new_v4()),
                data: record(json!({"slug": "x"})),
                props,
            })
            .unwrap_err();
        assert_eq!(
            err,
            DatabaseError::NotAuthorized("A user does not have permissions to update this record at - slug.".into())
        );
    }

    #[tokio::test]
    async fn permission_if_narrows_rows_for_that_role() {
        let project_id = Uuid::new_v4();
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![count_row(3)]]));
        let svc = DatabaseService::<incident::Entity>::new(Arc::clone(&db), SECRET);

        let member = svc
            .as_find_by_permissions(FindBy {
                props: member_props(project_id, &[Permission::ProjectMember]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(member.query.get("is_public"), Some(&QueryValue::Eq(json!(true))));

        let owner = svc
            .as_find_by_permissions(FindBy {
                props: member_props(project_id, &[Permission::ProjectOwner]),
                ..Default::default()
            })
            .unwrap();
        assert!(!owner.query.contains("is_public"));

        let count = svc
            .count_by(CountBy { props: member_props(project_id, &[Permission::ProjectMember]), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(count, 3);
        let log = logged_sql(&db);
        assert!(log[0].contains("\"incident\".\"is_public\" = TRUE"), "{}", log[0]);
    }

    #[tokio::test]
    async fn disconnected_database_reports_not_connected() {
        let svc = DatabaseService::<monitor::Entity>::new(disconnected(), SECRET);
        let err = svc
            .count_by(CountBy { props: DatabaseCommonInteractionProps::root(), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err, DatabaseError::NotConnected);
    }

    #[tokio::test]
    async fn create_checks_required_fields() {
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres));
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let err = svc
            .create(CreateBy {
                data: record(json!({"project_id": Uuid::new_v4().to_string()})),
                props: DatabaseCommonInteractionProps::root(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, DatabaseError::BadData("name is required".into()));
        assert!(logged_sql(&db).is_empty());
    }

    #[tokio::test]
    async fn overlong_names_are_bad_data() {
        let target = monitor_row(Uuid::new_v4(), "Web");
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![target.clone()]]));
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let err = svc
            .create(CreateBy {
                data: record(json!({"name": "n".repeat(101), "project_id": Uuid::new_v4().to_string()})),
                props: DatabaseCommonInteractionProps::root(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, DatabaseError::BadData("name cannot be more than 100 characters.".into()));
        assert!(logged_sql(&db).is_empty());

        let err = svc
            .update_one_by_id(UpdateById {
                id: target.id,
                data: record(json!({"name": "n".repeat(101)})),
                props: DatabaseCommonInteractionProps::root(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, DatabaseError::BadData("name cannot be more than 100 characters.".into()));
        let log = logged_sql(&db);
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with("SELECT"), "{}", log[0]);
    }

    #[tokio::test]
    async fn slug_of_a_full_length_name_fits_its_column() {
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![count_row(0)]])
                .append_query_results([vec![monitor_row(Uuid::new_v4(), "long")]]),
        );
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let name = "a".repeat(100);
        svc.create(CreateBy {
            data: record(json!({"name": name, "project_id": Uuid::new_v4().to_string()})),
            props: DatabaseCommonInteractionProps::root(),
        })
        .await
        .unwrap();
        let log = logged_sql(&db);
        assert!(log[1].starts_with("INSERT INTO \"monitor\""), "{}", log[1]);

        let mut data = record(json!({"name": name}));
        svc.generate_slug(&mut data);
        let slug = data["slug"].as_str().unwrap_or_default();
        assert!(slug.chars().count() <= SLUG_MAX_LEN, "{}", slug);
        assert!(slug.starts_with("aaaa"), "{}", slug);
    }

    #[tokio::test]
    async fn create_strips_columns_and_sets_project() {
        let project_id = Uuid::new_v4();
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![count_row(0)]])
                .append_query_results([vec![monitor_row(project_id, "Home Page")]]),
        );
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);

        let created = svc
            .create(CreateBy {
                data: record(json!({
                    "name": "Home Page",
                    "deleted_by_user_id": Uuid::new_v4().to_string(),
                })),
                props: member_props(project_id, &[Permission::ProjectOwner]),
            })
            .await
            .unwrap();
        assert_eq!(created["name"], json!("Home Page"));

        let log = logged_sql(&db);
        assert_eq!(log.len(), 2);
        assert!(log[0].contains("COUNT"), "{}", log[0]);
        assert!(log[1].starts_with("INSERT INTO \"monitor\""), "{}", log[1]);
        assert!(log[1].contains(&project_id.to_string()), "{}", log[1]);
        assert!(log[1].contains("home-page"), "{}", log[1]);
        assert!(!log[1].contains("deleted_by_user_id"), "{}", log[1]);
    }

    #[tokio::test]
    async fn duplicate_name_in_project_rejected() {
        let project_id = Uuid::new_v4();
        let svc = DatabaseService::<monitor::Entity>::new(
            mock(MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![count_row(1)]])),
            SECRET,
        );
        let err = svc
            .create(CreateBy {
                data: record(json!({"name": "Home Page", "project_id": project_id.to_string()})),
                props: DatabaseCommonInteractionProps::root(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, DatabaseError::BadData("Monitor with the same name already exists.".into()));
    }

    #[tokio::test]
    async fn rename_onto_a_taken_name_rejected() {
        let project_id = Uuid::new_v4();
        let target = monitor_row(project_id, "Web");
        let other = monitor_row(project_id, "API");
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![target.clone()]])
                .append_query_results([vec![target]])
                .append_query_results([vec![other]]),
        );
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let err = svc
            .update_by(UpdateBy {
                query: Query::by_id(Uuid::new_v4()),
                data: record(json!({"name": "api"})),
                props: DatabaseCommonInteractionProps::root(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, DatabaseError::BadData("Monitor with the same name already exists.".into()));

        let log = logged_sql(&db);
        assert_eq!(log.len(), 3);
        assert!(log[2].contains("LOWER(\"monitor\".\"name\") = 'api'"), "{}", log[2]);
        assert!(log[2].contains(&project_id.to_string()), "{}", log[2]);
    }

    #[tokio::test]
    async fn rename_keeping_own_name_updates_and_stamps() {
        let project_id = Uuid::new_v4();
        let target = monitor_row(project_id, "Web");
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![target.clone()]])
                .append_query_results([vec![target.clone()]])
                .append_query_results([vec![target.clone()]])
                .append_exec_results([exec_ok(1)]),
        );
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let affected = svc
            .update_one_by_id(UpdateById {
                id: target.id,
                data: record(json!({"name": "WEB"})),
                props: DatabaseCommonInteractionProps::root(),
            })
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let log = logged_sql(&db);
        assert_eq!(log.len(), 4);
        assert!(log[3].starts_with("UPDATE \"monitor\" SET"), "{}", log[3]);
        assert!(log[3].contains("\"updated_at\" ="), "{}", log[3]);
        assert!(log[3].contains(&target.id.to_string()), "{}", log[3]);
    }

    #[tokio::test]
    async fn update_counts_every_matched_row() {
        let project_id = Uuid::new_v4();
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![id_row(Uuid::new_v4()), id_row(Uuid::new_v4())]])
                .append_exec_results([exec_ok(1), exec_ok(1)]),
        );
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let affected = svc
            .update_by(UpdateBy {
                query: Query::new().with("project_id", project_id),
                data: record(json!({"description": "checked hourly"})),
                props: DatabaseCommonInteractionProps::root(),
            })
            .await
            .unwrap();
        assert_eq!(affected, 2);
        let updates = logged_sql(&db).into_iter().filter(|sql| sql.starts_with("UPDATE")).count();
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn encrypted_update_reuses_the_row_iv() {
        let project_id = Uuid::new_v4();
        let row = api_key_row(project_id);
        let iv = Encryption::generate_iv();
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![row.clone()]])
                .append_query_results([vec![BTreeMap::from([
                    ("id", SeaValue::from(row.id)),
                    ("iv", SeaValue::from(iv.clone())),
                ])]])
                .append_exec_results([exec_ok(1)]),
        );
        let svc = DatabaseService::<api_key::Entity>::new(Arc::clone(&db), SECRET);
        let affected = svc
            .update_one_by_id(UpdateById {
                id: row.id,
                data: record(json!({"api_key": "rotated-key"})),
                props: DatabaseCommonInteractionProps::root(),
            })
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let log = logged_sql(&db);
        assert_eq!(log.len(), 3);
        assert!(log[1].contains("\"api_key\".\"iv\""), "{}", log[1]);
        let update = &log[2];
        let expected = svc.encryption.encrypt("api_key", "rotated-key", &iv).unwrap();
        assert!(update.starts_with("UPDATE \"api_key\" SET"), "{}", update);
        assert!(update.contains(&expected), "{}", update);
        assert!(!update.contains("rotated-key"), "{}", update);
        assert!(!update.contains("\"iv\""), "{}", update);
        assert!(update.contains("\"updated_at\""), "{}", update);
    }

    #[tokio::test]
    async fn encrypted_column_never_stored_in_plain_text() {
        let project_id = Uuid::new_v4();
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![count_row(0)]])
                .append_query_results([vec![api_key_row(project_id)]]),
        );
        let svc = DatabaseService::<api_key::Entity>::new(Arc::clone(&db), SECRET);
        let created = svc
            .create(CreateBy {
                data: record(json!({
                    "project_id": project_id.to_string(),
                    "name": "ci",
                    "expires_at": "2099-01-01T00:00:00Z",
                    "api_key": "plain-key-value",
                })),
                props: DatabaseCommonInteractionProps::root(),
            })
            .await
            .unwrap();
        assert!(!created.contains_key(IV_COLUMN));

        let log = logged_sql(&db);
        assert!(!log[1].contains("plain-key-value"), "{}", log[1]);
        assert!(log[1].contains("\"iv\""), "{}", log[1]);
    }

    #[test]
    fn encryption_round_trips_objects_and_hashing_is_idempotent() {
        let svc = DatabaseService::<api_key::Entity>::new(disconnected(), SECRET);
        let mut data = record(json!({"api_key": "abc"}));
        svc.encrypt(&mut data).unwrap();
        assert_ne!(data["api_key"], json!("abc"));
        svc.decrypt(&mut data).unwrap();
        assert_eq!(data["api_key"], json!("abc"));

        let users = DatabaseService::<models::user::Entity>::new(disconnected(), SECRET);
        let mut data = record(json!({"password": "hunter22"}));
        users.hash(&mut data).unwrap();
        let once = data["password"].clone();
        users.hash(&mut data).unwrap();
        assert_eq!(data["password"], once);
        assert!(is_value_hashed(once.as_str().unwrap_or_default()));
    }

    #[test]
    fn passwords_are_argon2_and_verify_with_the_secret() {
        let users = DatabaseService::<models::user::Entity>::new(disconnected(), SECRET);
        let mut data = record(json!({"password": "hunter22"}));
        users.hash(&mut data).unwrap();
        let stored = data["password"].as_str().unwrap_or_default().to_owned();
        assert!(stored.starts_with("$argon2id$"), "{}", stored);
        assert!(users.matches_hashed("hunter22", &stored));
        assert!(!users.matches_hashed("hunter23", &stored));

        let other_secret = DatabaseService::<models::user::Entity>::new(disconnected(), "another-secret");
        assert!(!other_secret.matches_hashed("hunter22", &stored));
    }

    #[tokio::test]
    async fn find_trims_to_select_and_hides_soft_deleted() {
        let project_id = Uuid::new_v4();
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![monitor_row(project_id, "API"), monitor_row(project_id, "Web")]]),
        );
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let items = svc
            .find_by(FindBy {
                select: Select::from(["name".to_owned()]),
                limit: 10,
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        let mut keys: Vec<&str> = items[0].keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["created_at", "id", "name"]);

        let log = logged_sql(&db);
        assert!(log[0].contains("\"deleted_at\" IS NULL"), "{}", log[0]);
        assert!(log[0].contains("ORDER BY \"monitor\".\"created_at\" DESC"), "{}", log[0]);
    }

    #[tokio::test]
    async fn populate_nests_relations_by_name() {
        let project_id = Uuid::new_v4();
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![monitor_row(project_id, "API")]])
                .append_query_results([vec![BTreeMap::from([
                    ("id", SeaValue::from(project_id)),
                    ("name", SeaValue::from("Acme".to_owned())),
                ])]]),
        );
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let items = svc
            .find_by(FindBy {
                select: Select::from(["name".to_owned()]),
                populate: ["project".to_owned()].into(),
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(items[0]["project"], json!({"id": project_id.to_string(), "name": "Acme"}));
        assert!(!items[0].contains_key("project_id"));

        let log = logged_sql(&db);
        assert!(log[1].contains("FROM \"project\""), "{}", log[1]);

        // foreign-key columns are not relation names
        let err = svc
            .find_by(FindBy {
                populate: ["project_id".to_owned()].into(),
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, DatabaseError::BadData("project_id is not a relation of Monitor".into()));
    }

    #[tokio::test]
    async fn search_returns_page_and_total() {
        let project_id = Uuid::new_v4();
        let db = mock(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![monitor_row(project_id, "API")]])
                .append_query_results([vec![count_row(7)]]),
        );
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let result = svc
            .search_by(SearchBy {
                query: Query::new().with("name", QueryValue::Search("api".into())),
                limit: 1,
                props: member_props(project_id, &[Permission::ProjectMember]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.count, 7);

        let log = logged_sql(&db);
        assert_eq!(log.len(), 2);
        assert!(log[0].contains("LIMIT"), "{}", log[0]);
        for sql in &log {
            assert!(sql.contains(&project_id.to_string()), "{}", sql);
            assert!(sql.contains("LIKE '%api%'"), "{}", sql);
        }
    }

    #[tokio::test]
    async fn soft_delete_stamps_instead_of_removing() {
        let project_id = Uuid::new_v4();
        let db = mock(MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([exec_ok(1)]));
        let svc = DatabaseService::<monitor::Entity>::new(Arc::clone(&db), SECRET);
        let affected = svc
            .delete_by(DeleteBy {
                query: Query::by_id(Uuid::new_v4()),
                props: member_props(project_id, &[Permission::ProjectOwner]),
            })
            .await
            .unwrap();
        assert_eq!(affected, 1);
        let log = logged_sql(&db);
        assert!(log[0].starts_with("UPDATE \"monitor\" SET \"deleted_at\""), "{}", log[0]);
    }
}
