//! Lease client configuration.

use floatlease_types::{LeaseError, LeaseResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Timing and shutdown behaviour of a [`LeaseClient`](crate::LeaseClient).
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Seconds between renewal ticks.
    pub renewal_interval_secs: u64,
    /// Lease validity period granted by the server per acquire or renew.
    pub server_lease_secs: u64,
    /// How long transient renewal failures are tolerated before the lease
    /// is declared expired. Must exceed `server_lease_secs`.
    pub grace_period_secs: u64,
    /// Upper bound on one transport exchange (ms).
    pub request_timeout_ms: u64,
    /// Release a held lease when the client is dropped.
    pub release_on_drop: bool,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            renewal_interval_secs: 60,
            server_lease_secs: 300,
            grace_period_secs: 360,
            request_timeout_ms: 30_000,
            release_on_drop: true,
        }
    }
}

impl LeaseConfig {
    /// Loads and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidConfig`] if the file cannot be read or
    /// fails validation, and [`LeaseError::Serialization`] if it is not
    /// valid JSON.
    pub fn load_from(path: impl AsRef<Path>) -> LeaseResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LeaseError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_json(&contents)?;
        info!("Loaded lease config from {:?}", path);
        Ok(config)
    }

    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// See [`LeaseConfig::load_from`].
    pub fn from_json(json: &str) -> LeaseResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the timing constraints between the fields.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidConfig`] naming the first violated constraint.
    pub fn validate(&self) -> LeaseResult<()> {
        if self.renewal_interval_secs == 0 {
            return Err(LeaseError::InvalidConfig(
                "renewal_interval_secs must be non-zero".into(),
            ));
        }
        if self.renewal_interval_secs >= self.server_lease_secs {
            return Err(LeaseError::InvalidConfig(format!(
                "renewal_interval_secs ({}) must be below server_lease_secs ({})",
                self.renewal_interval_secs, self.server_lease_secs
            )));
        }
        if self.grace_period_secs <= self.server_lease_secs {
            return Err(LeaseError::InvalidConfig(format!(
                "grace_period_secs ({}) must exceed server_lease_secs ({})",
                self.grace_period_secs, self.server_lease_secs
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(LeaseError::InvalidConfig(
                "request_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Interval between renewal ticks.
    #[must_use]
    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_interval_secs)
    }

    /// Transient-failure grace window.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Per-exchange transport timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
