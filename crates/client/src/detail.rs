use std::collections::BTreeSet;
use std::marker::PhantomData;

use uuid::Uuid;

use models::permission::{does_permissions_intersect, UserProjectAccessPermission};
use models::CrudEntity;

use crate::api::{ModelApi, Record};
use crate::errors::ClientError;
use crate::form::{FormField, FormType, ModelForm};

/// A card showing one record, with an edit action for callers allowed to update it.
pub struct CardModelDetail<E> {
    pub title: String,
    pub description: String,
    /// Columns shown on the card.
    pub fields: Vec<&'static str>,
    pub is_editable: bool,
    pub form_fields: Vec<FormField>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: CrudEntity> CardModelDetail<E> {
    pub fn new(title: impl Into<String>, description: impl Into<String>, fields: Vec<&'static str>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            fields,
            is_editable: false,
            form_fields: Vec::new(),
            _entity: PhantomData,
        }
    }

    pub fn editable(mut self, form_fields: Vec<FormField>) -> Self {
        self.is_editable = true;
        self.form_fields = form_fields;
        self
    }

    /// Editing needs the flag and a project permission that may update the table.
    pub fn can_edit(&self, project: Option<&UserProjectAccessPermission>) -> bool {
        let Some(project) = project else { return false };
        self.is_editable && does_permissions_intersect(&E::metadata().table_access.update, &project.permission_list())
    }

    pub fn edit_button_title(&self) -> String {
        format!("Edit {}", E::metadata().singular_name)
    }

    pub fn form_id(&self) -> String {
        format!("edit-{}-form", E::metadata().singular_name.to_lowercase().replace(' ', "-"))
    }

    pub fn edit_form(&self, item_id: Uuid) -> ModelForm<E> {
        ModelForm::new(self.form_id(), FormType::Update, self.form_fields.clone()).editing(item_id)
    }

    pub async fn load(&self, api: &ModelApi, item_id: Uuid) -> Result<Option<Record>, ClientError> {
        let select: BTreeSet<String> = self.fields.iter().map(|f| (*f).to_owned()).collect();
        api.get_item::<E>(item_id, &select, &BTreeSet::new()).await
    }
}
