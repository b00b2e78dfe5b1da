//! Page configurations built from the generic components.

use models::api_key;

use crate::form::{FormField, FormFieldType};
use crate::table::{CardProps, ModelTable, TableColumn, TableColumnKind};

/// Project settings: API keys.
pub fn api_keys_page() -> ModelTable<api_key::Entity> {
    let mut table = ModelTable::new(
        "api-keys-table",
        CardProps {
            title: "API Keys".into(),
            description: "All you can do on the dashboard can be done via the API. Use the API to automate \
                          repetitive work or integrate with other platforms you have."
                .into(),
        },
        vec![
            TableColumn::new("name", "Name", TableColumnKind::Text).filterable(),
            TableColumn::new("description", "Description", TableColumnKind::Text).filterable(),
            TableColumn::new("expires_at", "Expires", TableColumnKind::Date).filterable().only_show_date(),
        ],
    );
    table.no_items_message = "No API Keys created for this project so far.".into();
    table.is_deleteable = false;
    table.is_editable = true;
    table.is_createable = true;
    table.is_viewable = true;
    table.show_refresh_button = true;
    table.show_filter_button = true;
    table.form_fields = vec![
        FormField::new("name", "Name", FormFieldType::Text)
            .required()
            .placeholder("API Key Name")
            .no_spaces()
            .min_length(2),
        FormField::new("description", "Description", FormFieldType::LongText)
            .required()
            .placeholder("API Key Description"),
        FormField::new("expires_at", "Expires", FormFieldType::Date)
            .required()
            .placeholder("Expires at")
            .date_in_future(),
    ];
    table
}
