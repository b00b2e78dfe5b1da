//! HTTP client for the model CRUD API. Every call targets the CRUD path of
//! the model's metadata and carries the current project and session.

use std::collections::BTreeSet;

use reqwest::{header, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use common::types::{ErrorBody, PROJECT_ID_HEADER};
use models::metadata::ID_COLUMN;
use models::CrudEntity;

use crate::errors::ClientError;
use crate::form::FormType;

pub type Record = Map<String, Value>;

pub const DEFAULT_LIST_LIMIT: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    pub query: Record,
    pub select: BTreeSet<String>,
    pub sort: Record,
    pub populate: BTreeSet<String>,
    pub skip: u64,
    pub limit: u64,
}

impl ListRequest {
    pub fn new(select: BTreeSet<String>) -> Self {
        Self { select, limit: DEFAULT_LIST_LIMIT, ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListResult {
    pub data: Vec<Record>,
    pub count: u64,
    pub skip: u64,
    pub limit: u64,
}

/// `{"col": true, ..}`, the shape the server reads for select and populate.
pub fn column_flags(columns: &BTreeSet<String>) -> Value {
    Value::Object(columns.iter().map(|c| (c.clone(), Value::Bool(true))).collect())
}

#[derive(Clone)]
pub struct ModelApi {
    http: reqwest::Client,
    base_url: String,
    project_id: Option<Uuid>,
    token: Option<String>,
}

impl ModelApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url, project_id: None, token: None })
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_project(&mut self, project_id: Option<Uuid>) {
        self.project_id = project_id;
    }

    pub fn project_id(&self) -> Option<Uuid> {
        self.project_id
    }

    /// Logs in and keeps the issued token for later calls.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<Value, ClientError> {
        let url = format!("{}/auth/login", self.base_url);
        let body = Self::send(self.http.post(url).json(&json!({"email": email, "password": password}))).await?;
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Parse("login response has no token".into()))?;
        self.token = Some(token.to_owned());
        Ok(body)
    }

    fn crud_url<E: CrudEntity>(&self, operation: &str, suffix: &str) -> Result<String, ClientError> {
        let Some(path) = E::metadata().crud_api_path else {
            return Err(ClientError::bad_data(format!("This model does not support {operation} operations.")));
        };
        Ok(format!("{}/api{}{}", self.base_url, path, suffix))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(project_id) = self.project_id {
            builder = builder.header(PROJECT_ID_HEADER, project_id.to_string());
        }
        if let Some(token) = &self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    async fn send(builder: RequestBuilder) -> Result<Value, ClientError> {
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or_else(|_| if text.is_empty() { status.to_string() } else { text });
            debug!(status = status.as_u16(), %message, "request failed");
            return Err(ClientError::Http { status: status.as_u16(), message });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        Ok(resp.json::<Value>().await?)
    }

    pub async fn create<E: CrudEntity>(&self, data: Record) -> Result<Value, ClientError> {
        self.create_or_update::<E>(FormType::Create, data, Record::new()).await
    }

    /// `data` must carry the `id` of the record to update.
    pub async fn update<E: CrudEntity>(&self, data: Record) -> Result<Value, ClientError> {
        self.create_or_update::<E>(FormType::Update, data, Record::new()).await
    }

    pub async fn create_or_update<E: CrudEntity>(
        &self,
        form_type: FormType,
        data: Record,
        misc_data_props: Record,
    ) -> Result<Value, ClientError> {
        let url = self.crud_url::<E>("create or update", "")?;
        let (method, url) = match form_type {
            FormType::Create => (Method::POST, url),
            FormType::Update => {
                let id = data
                    .get(ID_COLUMN)
                    .and_then(Value::as_str)
                    .ok_or_else(|| ClientError::bad_data("Model ID to update not found."))?;
                (Method::PUT, format!("{url}/{id}"))
            }
        };
        let body = json!({"data": data, "miscDataProps": misc_data_props});
        Self::send(self.request(method, url).json(&body)).await
    }

    pub async fn get_list<E: CrudEntity>(&self, req: ListRequest) -> Result<ListResult, ClientError> {
        let url = self.crud_url::<E>("list", "/get-list")?;
        let populate = if req.populate.is_empty() { Value::Null } else { column_flags(&req.populate) };
        let body = json!({
            "query": req.query,
            "select": column_flags(&req.select),
            "sort": req.sort,
            "populate": populate,
        });
        let builder = self
            .request(Method::POST, url)
            .query(&[("limit", req.limit), ("skip", req.skip)])
            .json(&body);
        let value = Self::send(builder).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Parse(e.to_string()))
    }

    pub async fn count<E: CrudEntity>(&self, query: Record) -> Result<u64, ClientError> {
        let url = self.crud_url::<E>("count", "/count")?;
        let value = Self::send(self.request(Method::POST, url).json(&json!({"query": query}))).await?;
        value
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ClientError::Parse("count response has no count".into()))
    }

    pub async fn get_item<E: CrudEntity>(
        &self,
        id: Uuid,
        select: &BTreeSet<String>,
        populate: &BTreeSet<String>,
    ) -> Result<Option<Record>, ClientError> {
        let url = self.crud_url::<E>("get", &format!("/{id}/get-item"))?;
        let populate = if populate.is_empty() { Value::Null } else { column_flags(populate) };
        let body = json!({"select": column_flags(select), "populate": populate});
        match Self::send(self.request(Method::POST, url).json(&body)).await? {
            Value::Object(item) => Ok(Some(item)),
            Value::Null => Ok(None),
            other => Err(ClientError::Parse(format!("unexpected item: {other}"))),
        }
    }

    pub async fn delete_item<E: CrudEntity>(&self, id: Uuid) -> Result<(), ClientError> {
        let url = self.crud_url::<E>("delete", &format!("/{id}"))?;
        Self::send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
