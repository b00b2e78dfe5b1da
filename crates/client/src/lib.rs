//! Client side of the model API: a typed HTTP client plus the form, detail
//! and table configurations that drive it from model metadata.

pub mod api;
pub mod detail;
pub mod errors;
pub mod form;
pub mod pages;
pub mod table;

pub use api::{ListRequest, ListResult, ModelApi};
pub use detail::CardModelDetail;
pub use errors::ClientError;
pub use form::{FormField, FormFieldType, FormType, ModelForm};
pub use pages::api_keys_page;
pub use table::ModelTable;
