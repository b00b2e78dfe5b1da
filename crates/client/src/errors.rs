use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    BadData(String),
    /// Non-2xx response; `message` is the server's `error` field.
    #[error("{message} (status {status})")]
    Http { status: u16, message: String },
    #[error("invalid form values: {}", .0.values().cloned().collect::<Vec<_>>().join(" "))]
    Validation(BTreeMap<String, String>),
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl ClientError {
    pub fn bad_data(msg: impl Into<String>) -> Self {
        ClientError::BadData(msg.into())
    }

    /// The message a form shows for this error.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::BadData(m) | ClientError::Http { message: m, .. } => m.clone(),
            ClientError::Validation(_) => self.to_string(),
            ClientError::Network(_) | ClientError::Parse(_) => "Server Error. Please try again".to_owned(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Parse(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}
