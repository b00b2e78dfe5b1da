//! Registration, login and token verification on top of the generic
//! user service.

pub mod domain;
pub mod errors;
pub mod service;

pub use domain::{AuthSession, AuthUser, Claims, LoginInput, RegisterInput};
pub use errors::AuthError;
pub use service::{AuthConfig, AuthService};
