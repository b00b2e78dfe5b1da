use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use configs::AppConfig;
use dotenvy::dotenv;
use migration::MigratorTrait;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use service::auth::{AuthConfig, AuthService};
use service::{AccessService, DbHandle};

use crate::errors::StartupError;
use crate::routes::{self, auth::ServerState};

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

fn bind_addr(cfg: &AppConfig) -> Result<SocketAddr, StartupError> {
    format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .map_err(|e| StartupError::InvalidConfig(format!("server address: {e}")))
}

/// Shared state for a connected, migrated database.
pub fn build_state(db: DbHandle, cfg: &AppConfig) -> ServerState {
    let secret = cfg.security.encryption_secret.as_str();
    let auth = AuthService::new(Arc::clone(&db), secret, AuthConfig::from_security(&cfg.security));
    let access = AccessService::with_ttl(
        Arc::clone(&db),
        secret,
        Duration::from_secs(cfg.security.permission_cache_ttl_secs),
    );
    ServerState { db, encryption_secret: Arc::from(secret), auth, access }
}

/// Connects, migrates and returns the application router.
pub async fn build_app(cfg: &AppConfig) -> Result<Router, StartupError> {
    let db = models::db::connect_with_config(&models::db::DatabaseConfig::from(&cfg.database))
        .await
        .map_err(|e| StartupError::Database(e.to_string()))?;
    if let Err(e) = migration::Migrator::up(&db, None).await {
        warn!(error = %e, "migrations not applied");
    }
    Ok(routes::build_router(build_state(Arc::new(db), cfg), build_cors()))
}

/// Public entry: build the app and run the HTTP server
pub async fn run() -> Result<(), StartupError> {
    dotenv().ok();
    common::utils::logging::init_logging_from_env();

    let cfg = AppConfig::load_or_env().map_err(|e| StartupError::InvalidConfig(e.to_string()))?;
    let app = build_app(&cfg).await?;

    let addr = bind_addr(&cfg)?;
    info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError::Any(e.into()))?;
    axum::serve(listener, app).await.map_err(|e| StartupError::Any(e.into()))?;
    Ok(())
}
