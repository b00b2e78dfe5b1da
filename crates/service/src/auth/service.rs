use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header as JwtHeader, Validation};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use models::user;

use super::domain::{AuthSession, AuthUser, Claims, LoginInput, RegisterInput};
use super::errors::AuthError;
use crate::database::{DatabaseService, DbHandle};
use crate::types::{CountBy, CreateBy, DatabaseCommonInteractionProps, FindOneBy, Query, QueryValue, Record};

/// Auth service configuration
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

impl AuthConfig {
    pub fn from_security(cfg: &configs::SecurityConfig) -> Self {
        Self { jwt_secret: cfg.jwt_secret.clone(), token_ttl: Duration::hours(cfg.token_ttl_hours) }
    }
}

/// Auth business service independent of web framework
#[derive(Clone)]
pub struct AuthService {
    users: DatabaseService<user::Entity>,
    cfg: AuthConfig,
}

fn to_auth_user(record: &Record) -> Result<AuthUser, AuthError> {
    let field = |name: &str| record.get(name).and_then(Value::as_str).unwrap_or_default().to_owned();
    let id = Uuid::parse_str(&field("id")).map_err(|e| AuthError::TokenError(format!("bad user id: {e}")))?;
    Ok(AuthUser { id, email: field("email"), name: field("name") })
}

impl AuthService {
    pub fn new(db: DbHandle, encryption_secret: &str, cfg: AuthConfig) -> Self {
        Self { users: DatabaseService::new(db, encryption_secret), cfg }
    }

    /// Register a new user. The password lands in a hashed column.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<AuthUser, AuthError> {
        user::validate_email(&input.email)?;
        user::validate_name(&input.name)?;
        user::validate_password(&input.password)?;
        let email = input.email.trim().to_lowercase();

        let existing = self
            .users
            .count_by(CountBy {
                query: Query::new().with("email", QueryValue::SameName(email.clone())),
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await?;
        if existing > 0 {
            debug!("user exists: {}", email);
            return Err(AuthError::Conflict);
        }

        let created = self
            .users
            .create(CreateBy {
                data: match json!({"email": email, "name": input.name, "password": input.password}) {
                    Value::Object(map) => map,
                    _ => Record::new(),
                },
                props: DatabaseCommonInteractionProps::root(),
            })
            .await?;
        let user = to_auth_user(&created)?;
        info!(user_id = %user.id, email = %user.email, "user_registered");
        Ok(user)
    }

    /// Authenticate a user and issue a token.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginInput) -> Result<AuthSession, AuthError> {
        let found = self
            .users
            .find_one_by(FindOneBy {
                query: Query::new().with("email", QueryValue::SameName(input.email.trim().to_owned())),
                select: ["email", "name", "password"].into_iter().map(str::to_owned).collect(),
                props: DatabaseCommonInteractionProps::root(),
                ..Default::default()
            })
            .await?
            .ok_or(AuthError::Unauthorized)?;

        let stored = found.get("password").and_then(Value::as_str).unwrap_or_default();
        if !self.users.matches_hashed(&input.password, stored) {
            return Err(AuthError::Unauthorized);
        }

        let user = to_auth_user(&found)?;
        let token = self.issue_token(&user)?;
        info!(user_id = %user.id, "user_logged_in");
        Ok(AuthSession { user, token })
    }

    pub fn issue_token(&self, user: &AuthUser) -> Result<String, AuthError> {
        let exp = (Utc::now() + self.cfg.token_ttl).timestamp().max(0) as usize;
        let claims = Claims { sub: user.email.clone(), uid: user.id, exp };
        encode(&JwtHeader::default(), &claims, &EncodingKey::from_secret(self.cfg.jwt_secret.as_bytes()))
            .map_err(|e| AuthError::TokenError(e.to_string()))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.cfg.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::Unauthorized
        })
    }
}
