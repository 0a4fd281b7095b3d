//! Location provider - an optional device position reading.

use std::fmt;

use async_trait::async_trait;

use crate::geo::Coordinates;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// The user did not grant location permission.
    PermissionDenied,
    /// Permission granted, but no fix could be obtained.
    Unavailable(String),
}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationError::PermissionDenied => write!(f, "location permission denied"),
            LocationError::Unavailable(msg) => write!(f, "location unavailable: {}", msg),
        }
    }
}

impl std::error::Error for LocationError {}

/// Permission-gated device position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// A provider that always answers the same way. Useful for tests and for
/// hosts that resolve the position themselves.
#[derive(Debug, Clone)]
pub struct FixedLocation {
    reading: Result<Coordinates, LocationError>,
}

impl FixedLocation {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            reading: Ok(Coordinates::new(latitude, longitude)),
        }
    }

    pub fn denied() -> Self {
        Self {
            reading: Err(LocationError::PermissionDenied),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            reading: Err(LocationError::Unavailable(reason.into())),
        }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        self.reading.clone()
    }
}
