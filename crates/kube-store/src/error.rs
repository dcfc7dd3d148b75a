//! Object store errors

use thiserror::Error;

/// Errors that can occur when reading or writing objects
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write raced another writer (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Create collided with an existing object of the same name
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// API server rejected the request
    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    /// Object could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Request never produced an API response (connection, TLS, timeout)
    #[error("Transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// True for optimistic-concurrency collisions a re-read can resolve
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match (ae.code, ae.reason.as_str()) {
                (404, _) => StoreError::NotFound(ae.message.clone()),
                (409, "AlreadyExists") => StoreError::AlreadyExists(ae.message.clone()),
                (409, _) => StoreError::Conflict(ae.message.clone()),
                (code, _) => StoreError::Api {
                    code,
                    message: ae.message.clone(),
                },
            },
            kube::Error::SerdeError(e) => StoreError::Serialization(e),
            other => StoreError::Transport(other.to_string()),
        }
    }
}
