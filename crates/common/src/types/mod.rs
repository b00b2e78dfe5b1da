use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    pub status: &'static str,
}

/// Body of every non-2xx JSON response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

/// Header carrying the tenant (project) a request acts on.
pub const PROJECT_ID_HEADER: &str = "projectid";

/// Cookie holding the session token issued at login.
pub const AUTH_COOKIE: &str = "auth_token";
