use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use serde_json::{json, Value};
use uuid::Uuid;

use models::metadata::{ID_COLUMN, CREATED_AT_COLUMN};
use models::permission::{does_permissions_intersect, Permission};
use models::{CrudEntity, DatabaseRequestType};

use crate::api::{ListRequest, ListResult, ModelApi, Record};
use crate::errors::ClientError;
use crate::form::{FormField, FormType, ModelForm};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableColumnKind {
    Text,
    Date,
    Boolean,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableColumn {
    pub field: &'static str,
    pub title: &'static str,
    pub kind: TableColumnKind,
    pub is_filterable: bool,
    pub only_show_date: bool,
}

impl TableColumn {
    pub fn new(field: &'static str, title: &'static str, kind: TableColumnKind) -> Self {
        Self { field, title, kind, is_filterable: false, only_show_date: false }
    }

    pub fn filterable(mut self) -> Self {
        self.is_filterable = true;
        self
    }

    pub fn only_show_date(mut self) -> Self {
        self.only_show_date = true;
        self
    }
}

/// Card header shown above the table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CardProps {
    pub title: String,
    pub description: String,
}

/// A paged, filterable list of one model with optional create/edit/delete actions.
pub struct ModelTable<E> {
    pub id: String,
    pub card: CardProps,
    pub no_items_message: String,
    pub is_createable: bool,
    pub is_editable: bool,
    pub is_deleteable: bool,
    pub is_viewable: bool,
    pub show_refresh_button: bool,
    pub show_filter_button: bool,
    pub columns: Vec<TableColumn>,
    pub form_fields: Vec<FormField>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: CrudEntity> ModelTable<E> {
    pub fn new(id: impl Into<String>, card: CardProps, columns: Vec<TableColumn>) -> Self {
        Self {
            id: id.into(),
            card,
            no_items_message: format!("No {} found.", E::metadata().plural_name.to_lowercase()),
            is_createable: false,
            is_editable: false,
            is_deleteable: false,
            is_viewable: false,
            show_refresh_button: false,
            show_filter_button: false,
            columns,
            form_fields: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Columns to fetch: the shown ones and the id.
    pub fn select(&self) -> BTreeSet<String> {
        let mut select: BTreeSet<String> = self.columns.iter().map(|c| c.field.to_owned()).collect();
        select.insert(ID_COLUMN.to_owned());
        select
    }

    fn allowed(&self, flag: bool, request: DatabaseRequestType, permissions: &[Permission]) -> bool {
        flag && does_permissions_intersect(E::metadata().record_permissions(request), permissions)
    }

    pub fn can_create(&self, permissions: &[Permission]) -> bool {
        self.allowed(self.is_createable, DatabaseRequestType::Create, permissions)
    }

    pub fn can_edit(&self, permissions: &[Permission]) -> bool {
        self.allowed(self.is_editable, DatabaseRequestType::Update, permissions)
    }

    pub fn can_delete(&self, permissions: &[Permission]) -> bool {
        self.allowed(self.is_deleteable, DatabaseRequestType::Delete, permissions)
    }

    pub fn can_view(&self, permissions: &[Permission]) -> bool {
        self.allowed(self.is_viewable, DatabaseRequestType::Read, permissions)
    }

    pub fn create_form(&self) -> ModelForm<E> {
        ModelForm::new(format!("create-{}", self.id), FormType::Create, self.form_fields.clone())
    }

    pub fn edit_form(&self, item_id: Uuid) -> ModelForm<E> {
        ModelForm::new(format!("edit-{}", self.id), FormType::Update, self.form_fields.clone()).editing(item_id)
    }

    /// Case-insensitive search on each filterable column with a non-empty filter.
    pub fn filter_query(&self, filters: &BTreeMap<String, String>) -> Record {
        self.columns
            .iter()
            .filter(|c| c.is_filterable)
            .filter_map(|c| {
                let text = filters.get(c.field)?.trim();
                (!text.is_empty()).then(|| (c.field.to_owned(), json!({"_type": "Search", "value": text})))
            })
            .collect()
    }

    /// One page, newest first. `page` starts at 1.
    pub async fn fetch_page(
        &self,
        api: &ModelApi,
        page: u64,
        per_page: u64,
        filters: &BTreeMap<String, String>,
    ) -> Result<ListResult, ClientError> {
        let mut sort = Record::new();
        sort.insert(CREATED_AT_COLUMN.to_owned(), Value::String("DESC".into()));
        let req = ListRequest {
            query: self.filter_query(filters),
            select: self.select(),
            sort,
            populate: BTreeSet::new(),
            skip: page.saturating_sub(1) * per_page,
            limit: per_page,
        };
        api.get_list::<E>(req).await
    }

    pub async fn delete(&self, api: &ModelApi, item_id: Uuid) -> Result<(), ClientError> {
        if !self.is_deleteable {
            return Err(ClientError::bad_data(format!("{} cannot be deleted here.", E::metadata().plural_name)));
        }
        api.delete_item::<E>(item_id).await
    }
}
