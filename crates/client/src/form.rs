//! Model-driven create/edit forms: which fields a caller may fill, what
//! to fetch for editing, how values are validated and submitted.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use models::metadata::ID_COLUMN;
use models::permission::{
    does_permissions_intersect, Permission, UserGlobalAccessPermission, UserProjectAccessPermission,
};
use models::CrudEntity;

use crate::api::{ModelApi, Record};
use crate::errors::ClientError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormType {
    Create,
    Update,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormFieldType {
    Text,
    LongText,
    Email,
    Password,
    Date,
    Boolean,
    Dropdown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldValidation {
    pub no_spaces: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub date_in_future: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormField {
    /// Model column the field edits.
    pub field: &'static str,
    pub title: &'static str,
    pub field_type: FormFieldType,
    pub required: bool,
    pub placeholder: Option<&'static str>,
    pub validation: FieldValidation,
    /// Value travels in `miscDataProps` under this key instead of in `data`.
    pub override_field_key: Option<&'static str>,
}

impl FormField {
    pub fn new(field: &'static str, title: &'static str, field_type: FormFieldType) -> Self {
        Self {
            field,
            title,
            field_type,
            required: false,
            placeholder: None,
            validation: FieldValidation::default(),
            override_field_key: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn placeholder(mut self, placeholder: &'static str) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn no_spaces(mut self) -> Self {
        self.validation.no_spaces = true;
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.validation.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.validation.max_length = Some(n);
        self
    }

    pub fn date_in_future(mut self) -> Self {
        self.validation.date_in_future = true;
        self
    }

    pub fn override_key(mut self, key: &'static str) -> Self {
        self.override_field_key = Some(key);
        self
    }

    /// First rule `value` breaks, if any.
    pub fn validate(&self, value: Option<&Value>, now: DateTime<Utc>) -> Option<String> {
        let text = match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        if text.trim().is_empty() {
            return self.required.then(|| format!("{} is required.", self.title));
        }

        let rules = &self.validation;
        if rules.no_spaces && text.chars().any(char::is_whitespace) {
            return Some(format!("{} should not have spaces.", self.title));
        }
        let len = text.chars().count();
        if let Some(min) = rules.min_length {
            if len < min {
                return Some(format!("{} cannot be less than {} characters.", self.title, min));
            }
        }
        if let Some(max) = rules.max_length {
            if len > max {
                return Some(format!("{} cannot be more than {} characters.", self.title, max));
            }
        }
        if rules.date_in_future || self.field_type == FormFieldType::Date {
            let Some(date) = parse_date(&text) else {
                return Some(format!("{} should be a valid date.", self.title));
            };
            if rules.date_in_future && date <= now {
                return Some(format!("{} should be a future date.", self.title));
            }
        }
        None
    }
}

/// RFC 3339 timestamps, or bare `YYYY-MM-DD` dates read as UTC midnight.
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Global permissions, plus project permissions when present, plus `Public`.
pub fn caller_permissions(
    global: Option<&UserGlobalAccessPermission>,
    project: Option<&UserProjectAccessPermission>,
) -> Vec<Permission> {
    let mut permissions: Vec<Permission> = global.map(|g| g.global_permissions.clone()).unwrap_or_default();
    if let Some(project) = project {
        permissions.extend(project.permission_list());
    }
    permissions.push(Permission::Public);
    permissions
}

pub struct ModelForm<E> {
    pub id: String,
    pub form_type: FormType,
    pub fields: Vec<FormField>,
    pub model_id_to_edit: Option<Uuid>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for ModelForm<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            form_type: self.form_type,
            fields: self.fields.clone(),
            model_id_to_edit: self.model_id_to_edit,
            _entity: PhantomData,
        }
    }
}

impl<E: CrudEntity> ModelForm<E> {
    pub fn new(id: impl Into<String>, form_type: FormType, fields: Vec<FormField>) -> Self {
        Self { id: id.into(), form_type, fields, model_id_to_edit: None, _entity: PhantomData }
    }

    pub fn editing(mut self, id: Uuid) -> Self {
        self.model_id_to_edit = Some(id);
        self
    }

    /// Declared fields whose column the caller may write for this form type.
    pub fn permitted_fields(&self, permissions: &[Permission]) -> Vec<&FormField> {
        let access = E::metadata().column_access_control_for_all_columns();
        self.fields
            .iter()
            .filter(|f| {
                access.get(f.field).is_some_and(|acl| {
                    let allowed = match self.form_type {
                        FormType::Create => &acl.create,
                        FormType::Update => &acl.update,
                    };
                    does_permissions_intersect(permissions, allowed)
                })
            })
            .collect()
    }

    pub fn select(&self) -> BTreeSet<String> {
        self.fields.iter().map(|f| f.field.to_owned()).collect()
    }

    /// Relations behind the entity fields; editing needs them resolved.
    pub fn populate(&self) -> BTreeSet<String> {
        let meta = E::metadata();
        self.fields
            .iter()
            .filter(|f| meta.is_entity_column(f.field))
            .filter_map(|f| meta.relation_for_column(f.field))
            .map(|r| r.name.to_owned())
            .collect()
    }

    /// Errors keyed by column, over the fields the caller can see.
    pub fn validate(&self, values: &Record, permissions: &[Permission]) -> BTreeMap<String, String> {
        let now = Utc::now();
        self.permitted_fields(permissions)
            .into_iter()
            .filter_map(|f| {
                let key = f.override_field_key.unwrap_or(f.field);
                f.validate(values.get(key), now).map(|msg| (f.field.to_owned(), msg))
            })
            .collect()
    }

    /// Populated relations in a fetched item become ids again, stored
    /// under the relation's foreign-key column.
    pub fn form_values_from_item(&self, mut item: Record) -> Record {
        let meta = E::metadata();
        for field in &self.fields {
            let Some(relation) = meta.relation_for_column(field.field) else { continue };
            let nested = item.remove(relation.name);
            let source = nested.as_ref().or_else(|| item.get(relation.column));
            if let Some(ids) = source.and_then(related_ids) {
                item.insert(relation.column.to_owned(), ids);
            }
        }
        item
    }

    /// Non-empty values of fields with an override key.
    pub fn misc_data_props(&self, values: &Record) -> Record {
        self.fields
            .iter()
            .filter_map(|f| f.override_field_key)
            .filter_map(|key| match values.get(key) {
                None | Some(Value::Null) | Some(Value::Bool(false)) => None,
                Some(Value::String(s)) if s.is_empty() => None,
                Some(v) => Some((key.to_owned(), v.clone())),
            })
            .collect()
    }

    /// Splits form values into the record to send and its misc data props.
    pub fn values_to_send(&self, values: &Record) -> (Record, Record) {
        let mut data: Record = self
            .select()
            .into_iter()
            .filter_map(|key| values.get(&key).cloned().map(|v| (key, v)))
            .collect();
        if self.form_type == FormType::Update {
            if let Some(id) = self.model_id_to_edit {
                data.insert(ID_COLUMN.to_owned(), Value::String(id.to_string()));
            }
        }
        let misc = self.misc_data_props(values);
        for key in misc.keys() {
            data.remove(key);
        }
        (data, misc)
    }

    /// Fetches the record being edited, shaped as form values.
    pub async fn load_item(&self, api: &ModelApi) -> Result<Record, ClientError> {
        let (FormType::Update, Some(id)) = (self.form_type, self.model_id_to_edit) else {
            return Err(ClientError::bad_data("Model ID to update not found."));
        };
        let item = api.get_item::<E>(id, &self.select(), &self.populate()).await?;
        let Some(item) = item else {
            let name = E::metadata().singular_name.to_lowercase();
            return Err(ClientError::bad_data(format!(
                "Cannot edit {name}. It could be because you don't have enough permissions to read or edit this {name}."
            )));
        };
        Ok(self.form_values_from_item(item))
    }

    pub async fn submit(&self, api: &ModelApi, values: &Record, permissions: &[Permission]) -> Result<Value, ClientError> {
        let errors = self.validate(values, permissions);
        if !errors.is_empty() {
            return Err(ClientError::Validation(errors));
        }
        let (data, misc) = self.values_to_send(values);
        debug!(form = %self.id, fields = data.len(), "submitting form");
        api.create_or_update::<E>(self.form_type, data, misc).await
    }
}

fn related_ids(value: &Value) -> Option<Value> {
    match value {
        Value::Array(entries) => {
            let ids: Vec<Value> = entries
                .iter()
                .filter_map(|e| e.as_object().and_then(|o| o.get(ID_COLUMN)).cloned())
                .collect();
            (!ids.is_empty()).then_some(Value::Array(ids))
        }
        Value::Object(obj) => obj.get(ID_COLUMN).cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use models::{api_key, monitor, team_member};
    use serde_json::json;

    use super::*;
    use crate::api::tests::stub_server;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    fn monitor_form(form_type: FormType) -> ModelForm<monitor::Entity> {
        ModelForm::new(
            "monitor-form",
            form_type,
            vec![
                FormField::new("name", "Name", FormFieldType::Text).required().min_length(2),
                FormField::new("description", "Description", FormFieldType::LongText),
                FormField::new("project_id", "Project", FormFieldType::Dropdown),
            ],
        )
    }

    #[test]
    fn field_rules() {
        let now = Utc::now();
        let name = FormField::new("name", "Name", FormFieldType::Text).required().no_spaces().min_length(2);
        assert_eq!(name.validate(None, now).as_deref(), Some("Name is required."));
        assert_eq!(name.validate(Some(&json!("a b")), now).as_deref(), Some("Name should not have spaces."));
        assert_eq!(name.validate(Some(&json!("a")), now).as_deref(), Some("Name cannot be less than 2 characters."));
        assert_eq!(name.validate(Some(&json!("ab")), now), None);

        let expires = FormField::new("expires_at", "Expires", FormFieldType::Date).date_in_future();
        let past = (now - Duration::days(1)).to_rfc3339();
        let future = (now + Duration::days(30)).format("%Y-%m-%d").to_string();
        assert_eq!(expires.validate(Some(&json!(past)), now).as_deref(), Some("Expires should be a future date."));
        assert_eq!(expires.validate(Some(&json!(future)), now), None);
        assert_eq!(expires.validate(Some(&json!("soon")), now).as_deref(), Some("Expires should be a valid date."));
        assert_eq!(expires.validate(None, now), None);
    }

    #[test]
    fn fields_follow_column_access() {
        let owner = caller_permissions(
            None,
            Some(&UserProjectAccessPermission {
                project_id: Uuid::new_v4(),
                permissions: vec![models::permission::UserPermission::unlabeled(Permission::ProjectOwner)],
            }),
        );
        let member = caller_permissions(
            None,
            Some(&UserProjectAccessPermission {
                project_id: Uuid::new_v4(),
                permissions: vec![models::permission::UserPermission::unlabeled(Permission::ProjectMember)],
            }),
        );
        assert!(owner.contains(&Permission::Public));

        let create = monitor_form(FormType::Create);
        let names: Vec<&str> = create.permitted_fields(&owner).iter().map(|f| f.field).collect();
        assert_eq!(names, vec!["name", "description", "project_id"]);
        assert!(create.permitted_fields(&member).is_empty());

        // project_id is not updatable
        let update = monitor_form(FormType::Update);
        let names: Vec<&str> = update.permitted_fields(&owner).iter().map(|f| f.field).collect();
        assert_eq!(names, vec!["name", "description"]);
    }

    #[test]
    fn select_populate_and_relations_to_ids() {
        let form = monitor_form(FormType::Update);
        assert_eq!(form.populate(), BTreeSet::from(["project".to_owned()]));
        assert_eq!(form.select().len(), 3);

        let item = record(json!({
            "name": "Homepage",
            "project_id": "p-1",
            "project": {"id": "p-1", "name": "Acme"}
        }));
        let values = form.form_values_from_item(item);
        assert_eq!(values["project_id"], json!("p-1"));
        assert_eq!(values["name"], json!("Homepage"));
        assert!(!values.contains_key("project"));

        // the column itself may carry the populated object
        let values = form.form_values_from_item(record(json!({"project_id": {"id": "p-2"}})));
        assert_eq!(values["project_id"], json!("p-2"));
    }

    #[test]
    fn populate_names_are_relations_the_server_knows() {
        let form: ModelForm<team_member::Entity> = ModelForm::new(
            "invite-form",
            FormType::Create,
            vec![
                FormField::new("team_id", "Team", FormFieldType::Dropdown),
                FormField::new("user_id", "User", FormFieldType::Dropdown),
                FormField::new("project_id", "Project", FormFieldType::Dropdown),
            ],
        );
        let populate = form.populate();
        assert_eq!(populate, BTreeSet::from(["team".to_owned(), "user".to_owned()]));
        let meta = team_member::Entity::metadata();
        assert!(populate.iter().all(|name| meta.relation_meta(name).is_some()));
    }

    #[test]
    fn values_to_send_strips_and_splits_misc() {
        let id = Uuid::new_v4();
        let form: ModelForm<monitor::Entity> = ModelForm::new(
            "edit-monitor-form",
            FormType::Update,
            vec![
                FormField::new("name", "Name", FormFieldType::Text),
                FormField::new("description", "Description", FormFieldType::LongText).override_key("notes"),
            ],
        )
        .editing(id);
        let values = record(json!({"name": "Homepage", "notes": "ping hourly", "stray": 1}));
        let (data, misc) = form.values_to_send(&values);
        assert_eq!(data, record(json!({"name": "Homepage", "id": id.to_string()})));
        assert_eq!(misc, record(json!({"notes": "ping hourly"})));
    }

    #[tokio::test]
    async fn submit_validates_then_posts() -> anyhow::Result<()> {
        let api = ModelApi::new(stub_server().await?)?;
        let form: ModelForm<api_key::Entity> = crate::pages::api_keys_page().create_form();
        let owner = vec![Permission::ProjectOwner, Permission::Public];

        let err = form.submit(&api, &record(json!({"name": "ci key"})), &owner).await.unwrap_err();
        let ClientError::Validation(errors) = err else { panic!("expected validation errors") };
        assert_eq!(errors["name"], "Name should not have spaces.");
        assert_eq!(errors["description"], "Description is required.");
        assert_eq!(errors["expires_at"], "Expires is required.");

        let expires = (Utc::now() + Duration::days(90)).to_rfc3339();
        let values = record(json!({"name": "ci-key", "description": "CI", "expires_at": expires}));
        let echoed = form.submit(&api, &values, &owner).await?;
        assert_eq!(echoed["data"]["name"], json!("ci-key"));
        assert_eq!(echoed["miscDataProps"], json!({}));
        Ok(())
    }

    #[tokio::test]
    async fn load_item_requires_an_id_and_a_readable_record() -> anyhow::Result<()> {
        let api = ModelApi::new(stub_server().await?)?;
        let err = monitor_form(FormType::Update).load_item(&api).await.unwrap_err();
        assert_eq!(err.to_string(), "Model ID to update not found.");

        let err = monitor_form(FormType::Update).editing(Uuid::new_v4()).load_item(&api).await.unwrap_err();
        assert!(err.to_string().starts_with("Cannot edit monitor."));
        Ok(())
    }
}
