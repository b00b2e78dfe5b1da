//! The generic CRUD surface mounted once per model.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use axum::extract::{FromRef, Path, Query as QueryParams, State};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use models::CrudEntity;
use service::{
    CountBy, CreateBy, DatabaseHooks, DatabaseService, DeleteBy, FindOneById, Query, Record, SearchBy, Sort,
    UpdateById,
};

use crate::errors::ApiError;
use crate::routes::auth::{Props, ServerState};

/// Page size used when `limit` is absent.
pub const DEFAULT_LIMIT: u64 = 10;

pub struct CrudState<E, H> {
    service: Arc<DatabaseService<E, H>>,
    server: ServerState,
    /// Mutations change who may access what.
    invalidates_access: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E, H> Clone for CrudState<E, H> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            server: self.server.clone(),
            invalidates_access: self.invalidates_access,
            _entity: PhantomData,
        }
    }
}

impl<E, H> FromRef<CrudState<E, H>> for ServerState {
    fn from_ref(state: &CrudState<E, H>) -> Self {
        state.server.clone()
    }
}

impl<E, H> CrudState<E, H> {
    async fn after_mutation(&self) {
        if self.invalidates_access {
            self.server.access.invalidate_all();
        }
    }
}

/// Column set accepted either as `["name", ..]` or as `{"name": true, ..}`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct KeySet(pub BTreeSet<String>);

impl<'de> Deserialize<'de> for KeySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeySetVisitor;

        impl<'de> Visitor<'de> for KeySetVisitor {
            type Value = KeySet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array of column names or an object of column flags")
            }

            fn visit_unit<E: de::Error>(self) -> Result<KeySet, E> {
                Ok(KeySet::default())
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<KeySet, A::Error> {
                let mut out = BTreeSet::new();
                while let Some(key) = seq.next_element::<String>()? {
                    out.insert(key);
                }
                Ok(KeySet(out))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<KeySet, A::Error> {
                let mut out = BTreeSet::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    if value != Value::Bool(false) {
                        out.insert(key);
                    }
                }
                Ok(KeySet(out))
            }
        }

        deserializer.deserialize_any(KeySetVisitor)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    pub data: Record,
    #[serde(default, rename = "miscDataProps")]
    pub misc_data_props: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListBody {
    pub query: Query,
    pub select: KeySet,
    pub sort: Sort,
    pub populate: KeySet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CountBody {
    pub query: Query,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ItemBody {
    pub select: KeySet,
    pub populate: KeySet,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub data: Record,
}

#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Bodies are optional on read routes; an empty body reads as `{}`.
fn body_or_default<T: Default>(body: Option<Json<T>>) -> T {
    body.map(|Json(b)| b).unwrap_or_default()
}

async fn create<E, H>(
    State(state): State<CrudState<E, H>>,
    Props(props): Props,
    Json(body): Json<CreateBody>,
) -> Result<Json<Record>, ApiError>
where
    E: CrudEntity,
    E::Model: Sync,
    H: DatabaseHooks<E> + 'static,
{
    if let Some(misc) = &body.misc_data_props {
        debug!(model = E::metadata().table_name, %misc, "misc data props received");
    }
    let created = state.service.create(CreateBy { data: body.data, props }).await?;
    state.after_mutation().await;
    Ok(Json(created))
}

async fn get_list<E, H>(
    State(state): State<CrudState<E, H>>,
    Props(props): Props,
    QueryParams(paging): QueryParams<Paging>,
    body: Option<Json<ListBody>>,
) -> Result<Json<Value>, ApiError>
where
    E: CrudEntity,
    E::Model: Sync,
    H: DatabaseHooks<E> + 'static,
{
    let body = body_or_default(body);
    let skip = paging.skip.unwrap_or(0);
    let limit = paging.limit.unwrap_or(DEFAULT_LIMIT);
    let result = state
        .service
        .search_by(SearchBy {
            query: body.query,
            select: body.select.0,
            sort: body.sort,
            populate: body.populate.0,
            skip,
            limit,
            props,
        })
        .await?;
    Ok(Json(json!({"data": result.items, "count": result.count, "skip": skip, "limit": limit})))
}

async fn count<E, H>(
    State(state): State<CrudState<E, H>>,
    Props(props): Props,
    body: Option<Json<CountBody>>,
) -> Result<Json<Value>, ApiError>
where
    E: CrudEntity,
    E::Model: Sync,
    H: DatabaseHooks<E> + 'static,
{
    let body = body_or_default(body);
    let count = state.service.count_by(CountBy { query: body.query, props, ..Default::default() }).await?;
    Ok(Json(json!({"count": count})))
}

async fn get_item<E, H>(
    State(state): State<CrudState<E, H>>,
    Path(id): Path<Uuid>,
    Props(props): Props,
    body: Option<Json<ItemBody>>,
) -> Result<Json<Value>, ApiError>
where
    E: CrudEntity,
    E::Model: Sync,
    H: DatabaseHooks<E> + 'static,
{
    let body = body_or_default(body);
    let item = state
        .service
        .find_one_by_id(FindOneById { id, select: body.select.0, populate: body.populate.0, props })
        .await?;
    Ok(Json(item.map(Value::Object).unwrap_or(Value::Null)))
}

async fn update_item<E, H>(
    State(state): State<CrudState<E, H>>,
    Path(id): Path<Uuid>,
    Props(props): Props,
    Json(body): Json<UpdateBody>,
) -> Result<Json<Value>, ApiError>
where
    E: CrudEntity,
    E::Model: Sync,
    H: DatabaseHooks<E> + 'static,
{
    state.service.update_one_by_id(UpdateById { id, data: body.data, props }).await?;
    state.after_mutation().await;
    Ok(Json(json!({})))
}

async fn delete_item<E, H>(
    State(state): State<CrudState<E, H>>,
    Path(id): Path<Uuid>,
    Props(props): Props,
) -> Result<Json<Value>, ApiError>
where
    E: CrudEntity,
    E::Model: Sync,
    H: DatabaseHooks<E> + 'static,
{
    state.service.delete_one_by(DeleteBy { query: Query::by_id(id), props }).await?;
    state.after_mutation().await;
    Ok(Json(json!({})))
}

/// Routes for one model, relative to its CRUD path.
pub fn crud_router<E, H>(service: DatabaseService<E, H>, server: ServerState, invalidates_access: bool) -> Router<ServerState>
where
    E: CrudEntity,
    E::Model: Sync,
    H: DatabaseHooks<E> + 'static,
{
    let state = CrudState { service: Arc::new(service), server, invalidates_access, _entity: PhantomData };
    Router::new()
        .route("/", post(create::<E, H>))
        .route("/get-list", post(get_list::<E, H>))
        .route("/count", post(count::<E, H>))
        .route("/:id/get-item", post(get_item::<E, H>))
        .route("/:id", put(update_item::<E, H>).delete(delete_item::<E, H>))
        .with_state(state)
}
