use thiserror::Error;

pub mod types;
pub mod crypto;
pub mod slug;
pub mod metrics;
pub mod utils;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("encryption error: {0}")]
    Encryption(String),
    #[error("hashing error: {0}")]
    Hashing(String),
    #[error("metrics error: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_type_ok() {
        let h = types::Health { status: "ok" };
        assert_eq!(h.status, "ok");
    }
}
