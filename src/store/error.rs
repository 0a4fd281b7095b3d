use std::fmt;

/// Error type for request store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Network or connection failure talking to the store.
    Unavailable(String),
    /// The store rejected the operation (constraint, permission, validation).
    Rejected(String),
    /// No row with this id.
    NotFound { collection: String, id: String },
    /// Opening or closing a change-feed subscription failed.
    Subscription(String),
    /// Payload could not be decoded.
    Serde(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
            StoreError::Rejected(msg) => write!(f, "store rejected operation: {}", msg),
            StoreError::NotFound { collection, id } => {
                write!(f, "not found: {}:{}", collection, id)
            }
            StoreError::Subscription(msg) => write!(f, "change feed subscription failed: {}", msg),
            StoreError::Serde(msg) => write!(f, "store payload error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err.to_string())
    }
}
