//! License server address.

use crate::error::{LeaseError, LeaseResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network address of the license server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServerEndpoint {
    /// Creates a validated endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidEndpoint`] if the host is blank, contains
    /// whitespace, or the port is zero.
    pub fn new(host: impl Into<String>, port: u16) -> LeaseResult<Self> {
        let host = host.into();
        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(LeaseError::InvalidEndpoint("host is empty".to_string()));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(LeaseError::InvalidEndpoint(format!(
                "host contains whitespace: {trimmed:?}"
            )));
        }
        if port == 0 {
            return Err(LeaseError::InvalidEndpoint("port must be non-zero".to_string()));
        }
        Ok(Self {
            host: trimmed.to_string(),
            port,
        })
    }

    /// Returns the `host:port` form used to dial the server.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}
