use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use common::types::{AUTH_COOKIE, PROJECT_ID_HEADER};
use service::auth::{AuthService, AuthUser, LoginInput, RegisterInput};
use service::{AccessService, DatabaseCommonInteractionProps, DbHandle};

use crate::errors::ApiError;

#[derive(Clone)]
pub struct ServerState {
    pub db: DbHandle,
    pub encryption_secret: Arc<str>,
    pub auth: AuthService,
    pub access: AccessService,
}

#[derive(Serialize)]
pub struct LoginOutput {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub token: String,
}

pub async fn register(
    State(state): State<ServerState>,
    Json(input): Json<RegisterInput>,
) -> Result<Json<AuthUser>, ApiError> {
    let user = state.auth.register(input).await?;
    Ok(Json(user))
}

pub async fn login(
    State(state): State<ServerState>,
    jar: CookieJar,
    Json(input): Json<LoginInput>,
) -> Result<(CookieJar, Json<LoginOutput>), ApiError> {
    let session = state.auth.login(input).await?;
    let user = session.user;
    let mut cookie = Cookie::new(AUTH_COOKIE, session.token.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(false);
    cookie.set_same_site(SameSite::Lax);
    let jar = jar.add(cookie);
    let out = LoginOutput { user_id: user.id, email: user.email, name: user.name, token: session.token };
    Ok((jar, Json(out)))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    let mut cookie = Cookie::from(AUTH_COOKIE);
    cookie.set_path("/");
    (jar.remove(cookie), StatusCode::NO_CONTENT)
}

/// Bearer token first, then the session cookie.
fn request_token(parts: &Parts) -> Result<Option<String>, ApiError> {
    if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
        let value = value.to_str().map_err(|_| ApiError::unauthorized("invalid Authorization header"))?;
        let Some(token) = value.strip_prefix("Bearer ") else {
            warn!(path = %parts.uri.path(), "invalid Authorization format (expect Bearer)");
            return Err(ApiError::unauthorized("invalid Authorization format"));
        };
        return Ok(Some(token.trim().to_owned()));
    }
    let jar = CookieJar::from_headers(&parts.headers);
    Ok(jar.get(AUTH_COOKIE).map(|c| c.value().to_owned()).filter(|t| !t.is_empty()))
}

fn request_project(parts: &Parts) -> Result<Option<Uuid>, ApiError> {
    let Some(value) = parts.headers.get(PROJECT_ID_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map(Some)
        .ok_or_else(|| ApiError::bad_request("invalid projectid header"))
}

/// Interaction props of the caller: who they are, which project they act
/// on and what they may do there.
pub struct Props(pub DatabaseCommonInteractionProps);

#[async_trait]
impl<S> FromRequestParts<S> for Props
where
    ServerState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = ServerState::from_ref(state);
        let user_id = match request_token(parts)? {
            Some(token) => Some(state.auth.verify_token(&token)?.uid),
            None => None,
        };
        let project_id = request_project(parts)?;
        let props = state.access.props_for(user_id, project_id).await?;
        Ok(Props(props))
    }
}
