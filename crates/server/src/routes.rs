pub mod auth;
pub mod crud;

use axum::{
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use common::{metrics, types::Health};
use models::{api_key, monitor, team, team_member, team_permission, CrudEntity};
use service::api_key::ApiKeyHooks;
use service::monitor::MonitorHooks;
use service::project::project_service;
use service::team::TeamHooks;
use service::{DatabaseHooks, DatabaseService};

use self::auth::ServerState;
use self::crud::crud_router;

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics_handler() -> (axum::http::StatusCode, String) {
    metrics::encode_metrics()
}

/// Mounts `service` under its model's CRUD path.
fn mount<E, H>(api: Router<ServerState>, state: &ServerState, service: DatabaseService<E, H>, invalidates_access: bool) -> Router<ServerState>
where
    E: CrudEntity,
    E::Model: Sync,
    H: DatabaseHooks<E> + 'static,
{
    let Some(path) = E::metadata().crud_api_path else {
        return api;
    };
    info!(path, model = E::metadata().table_name, "mounting crud routes");
    api.nest(path, crud_router(service, state.clone(), invalidates_access))
}

/// Model routers under `/api`; membership and permission changes reset the access cache.
fn api_router(state: &ServerState) -> Router<ServerState> {
    let db = state.db.clone();
    let secret: &str = &state.encryption_secret;
    let team_hooks = TeamHooks::new(db.clone(), secret);

    let api = Router::new();
    let api = mount(api, state, project_service(db.clone(), secret), true);
    let api = mount(api, state, DatabaseService::<team::Entity, _>::with_hooks(db.clone(), secret, team_hooks.clone()), true);
    let api = mount(
        api,
        state,
        DatabaseService::<team_member::Entity, _>::with_hooks(db.clone(), secret, team_hooks.clone()),
        true,
    );
    let api = mount(
        api,
        state,
        DatabaseService::<team_permission::Entity, _>::with_hooks(db.clone(), secret, team_hooks),
        true,
    );
    let api = mount(api, state, DatabaseService::<monitor::Entity, _>::with_hooks(db.clone(), secret, MonitorHooks), false);
    mount(api, state, DatabaseService::<api_key::Entity, _>::with_hooks(db, secret, ApiKeyHooks), false)
}

/// Build the full application router: health, metrics, auth and the model APIs
pub fn build_router(state: ServerState, cors: CorsLayer) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler));

    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout));

    public
        .merge(auth_routes)
        .nest("/api", api_router(&state))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        // one span per request carrying method and path
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        // status and latency
                        .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                        .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
                )
                .layer(cors),
        )
}
