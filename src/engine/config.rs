//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use crate::store::REQUESTS_COLLECTION;

/// Tunables for a `RequestEngine`.
///
/// Built with `with_*` setters over the defaults, or parsed from JSON:
///
/// ```
/// use neighbor_sync::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "refresh_timeout_ms": 2500 }"#).unwrap();
/// assert_eq!(config.refresh_timeout().as_millis(), 2500);
/// assert_eq!(config.init_timeout().as_secs(), 15);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on waiting for the first load.
    init_timeout_ms: u64,
    /// Upper bound on waiting for a manual refresh.
    refresh_timeout_ms: u64,
    /// Radius used when a nearby fetch does not name one.
    default_radius_km: f64,
    /// Change-feed collection to subscribe to.
    collection: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: 15_000,
            refresh_timeout_ms: 10_000,
            default_radius_km: 10.0,
            collection: REQUESTS_COLLECTION.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.init_timeout_ms == 0 || self.refresh_timeout_ms == 0 {
            return Err(EngineError::Config("timeouts must be positive".into()));
        }
        if !self.default_radius_km.is_finite() || self.default_radius_km < 0.0 {
            return Err(EngineError::Config(format!(
                "default radius must be a non-negative number, got {}",
                self.default_radius_km
            )));
        }
        if self.collection.is_empty() {
            return Err(EngineError::Config("collection must not be empty".into()));
        }
        Ok(())
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_default_radius_km(mut self, radius_km: f64) -> Self {
        self.default_radius_km = radius_km;
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn default_radius_km(&self) -> f64 {
        self.default_radius_km
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}
