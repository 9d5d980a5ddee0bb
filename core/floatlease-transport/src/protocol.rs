//! Lease protocol messages.

use floatlease_types::{Handle, Identity, LeaseError, LeaseResult, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum frame body size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Lease operations.
///
/// `RegisterIdentity` and `ConfigureEndpoint` are resolved locally by the
/// TCP transport and never appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RegisterIdentity,
    ConfigureEndpoint,
    Acquire,
    Renew,
    Release,
    HasActiveLease,
    GetMetadata,
}

/// Information about the client machine, sent with every request so the
/// server can show who holds a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Hostname.
    pub hostname: String,
    /// Operating system name.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// Process id of the leasing application.
    pub pid: u32,
}

impl ClientInfo {
    /// Collects information about the current machine and process.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            pid: std::process::id(),
        }
    }
}

/// A request to the license server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRequest {
    /// Protocol version.
    pub version: u32,
    /// Requested operation.
    pub op: Operation,
    /// Handle the request is for.
    pub handle: Handle,
    /// Identity bound to the handle.
    pub identity: Identity,
    /// Requesting machine.
    pub client: ClientInfo,
    /// Metadata key, for [`Operation::GetMetadata`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl LeaseRequest {
    /// Creates a request for an operation.
    pub fn new(op: Operation, handle: Handle, identity: Identity, client: ClientInfo) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            op,
            handle,
            identity,
            client,
            key: None,
        }
    }

    /// Sets the metadata key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A response from the license server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseResponse {
    /// Outcome of the request.
    pub status: StatusCode,
    /// Operation result, e.g. a metadata value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl LeaseResponse {
    /// A successful response without payload.
    pub fn ok() -> Self {
        Self {
            status: StatusCode::Ok,
            payload: None,
        }
    }

    /// A successful response carrying a payload.
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Ok,
            payload: Some(payload.into()),
        }
    }

    /// A failed response.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            payload: None,
        }
    }

    /// Converts the response into its payload, or the error its status maps to.
    ///
    /// # Errors
    ///
    /// Returns the [`LeaseError`] for any non-OK status.
    pub fn into_result(self) -> LeaseResult<Option<String>> {
        match LeaseError::from_status(self.status) {
            None => Ok(self.payload),
            Some(err) => Err(err),
        }
    }
}
