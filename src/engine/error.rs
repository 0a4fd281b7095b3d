//! Error types for the request engine.

use std::error::Error;
use std::fmt;

use crate::location::LocationError;
use crate::store::StoreError;

/// Error type for engine operations.
///
/// `Clone` so the same value can sit in the error slot and be returned to
/// the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The operation needs a signed-in user and there is none.
    NotAuthenticated,
    /// The engine was torn down.
    TornDown,
    /// The request store failed.
    Store(StoreError),
    /// The device position could not be read.
    Location(LocationError),
    /// Caller passed something unusable (bad coordinates, negative radius).
    InvalidInput(String),
    /// Configuration could not be parsed or is out of range.
    Config(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotAuthenticated => write!(f, "user not authenticated"),
            EngineError::TornDown => write!(f, "request engine has been torn down"),
            EngineError::Store(e) => write!(f, "{}", e),
            EngineError::Location(e) => write!(f, "{}", e),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            EngineError::Config(msg) => write!(f, "invalid engine config: {}", msg),
        }
    }
}

impl EngineError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::NotAuthenticated => 401,
            EngineError::TornDown => 503,
            EngineError::Store(StoreError::NotFound { .. }) => 404,
            EngineError::Store(StoreError::Rejected(_)) => 422,
            EngineError::Store(_) => 502,
            EngineError::Location(_) => 500,
            EngineError::InvalidInput(_) => 400,
            EngineError::Config(_) => 500,
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            EngineError::Location(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Store(err)
    }
}

impl From<LocationError> for EngineError {
    fn from(err: LocationError) -> Self {
        EngineError::Location(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}
