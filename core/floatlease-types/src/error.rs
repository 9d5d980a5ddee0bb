//! Error types for lease operations.

use crate::status::{ExpiryReason, StatusCode};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for lease operations.
pub type LeaseResult<T> = Result<T, LeaseError>;

/// Lease-specific errors.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Product identity is missing or malformed.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// The product descriptor file could not be read.
    #[error("product descriptor {path} unreadable: {source}")]
    DescriptorUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An identity is already bound to this client.
    #[error("identity already bound; it cannot be changed")]
    IdentityAlreadyBound,

    /// The handle is zero or unknown to the transport.
    #[error("invalid handle")]
    InvalidHandle,

    /// Server endpoint is missing or malformed.
    #[error("invalid server endpoint: {0}")]
    InvalidEndpoint(String),

    /// The endpoint cannot change while a lease is active.
    #[error("server endpoint cannot change while a lease is active")]
    EndpointLocked,

    /// A required configuration step has not happened yet.
    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    /// The operation needs an active lease.
    #[error("no active lease")]
    NoActiveLease,

    /// Client configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The server refused the request.
    #[error("server rejected request: {0}")]
    Rejected(Rejection),

    /// System time tampering was detected.
    #[error("{0} system time has been tampered with")]
    ClockTampered(ClockSide),

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The exchange did not complete within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The server's response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Caller-provided buffer is too small for the result.
    #[error("buffer too small: need {required} bytes, have {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broad classification of a [`LeaseError`], used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller configuration bug; never retried automatically.
    Configuration,
    /// The server refused, or answered in a way the client cannot use; not
    /// retried by the same client until conditions change.
    ServerRejection,
    /// Clock tampering; terminal for the current lease.
    TimeIntegrity,
    /// Connection or timeout failure; retried by renewal within the grace window.
    TransientNetwork,
    /// Result buffer too small; retry with more capacity.
    Buffer,
}

/// Reasons the server gives for refusing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// All seats are leased.
    NoFreeLicense,
    /// This handle already holds a lease.
    LicenseExists,
    /// The lease has expired or been taken by another client.
    LicenseExpired,
    /// The server declared the lease lost to network failures.
    LicenseExpiredNetwork,
    /// The metadata key does not exist.
    MetadataKeyNotFound,
    /// The product is unknown to the server.
    ProductMismatch,
    /// The product version is unknown to the server.
    VersionMismatch,
    /// Internal server error.
    Server,
    /// The server blamed the client.
    Client,
    /// Unspecified failure.
    Fail,
    /// Unrecognised status code.
    Other(u32),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFreeLicense => f.write_str("no free license is available"),
            Self::LicenseExists => f.write_str("license has already been leased"),
            Self::LicenseExpired => f.write_str("license lease has expired"),
            Self::LicenseExpiredNetwork => {
                f.write_str("license lease has expired due to network error")
            }
            Self::MetadataKeyNotFound => f.write_str("metadata key does not exist"),
            Self::ProductMismatch => f.write_str("product id is incorrect"),
            Self::VersionMismatch => f.write_str("product version is incorrect"),
            Self::Server => f.write_str("server error"),
            Self::Client => f.write_str("client error"),
            Self::Fail => f.write_str("request failed"),
            Self::Other(code) => write!(f, "status code {code}"),
        }
    }
}

/// Which machine's clock was tampered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockSide {
    Client,
    Server,
}

impl fmt::Display for ClockSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

impl LeaseError {
    /// Converts a non-OK response status into an error.
    ///
    /// Returns `None` for [`StatusCode::Ok`].
    #[must_use]
    pub fn from_status(status: StatusCode) -> Option<Self> {
        let err = match status {
            StatusCode::Ok => return None,
            StatusCode::Fail => Self::Rejected(Rejection::Fail),
            StatusCode::ProductId => Self::Rejected(Rejection::ProductMismatch),
            StatusCode::ProductVersion => Self::Rejected(Rejection::VersionMismatch),
            StatusCode::Callback => Self::NotConfigured("renewal failure callback"),
            StatusCode::Handle => Self::InvalidHandle,
            StatusCode::ServerAddress => {
                Self::InvalidEndpoint("rejected by the server".to_string())
            }
            StatusCode::ServerTime => Self::ClockTampered(ClockSide::Server),
            StatusCode::Time => Self::ClockTampered(ClockSide::Client),
            StatusCode::Inet => Self::Network("server reported a network failure".to_string()),
            StatusCode::NoFreeLicense => Self::Rejected(Rejection::NoFreeLicense),
            StatusCode::LicenseExists => Self::Rejected(Rejection::LicenseExists),
            StatusCode::LicenseExpired => Self::Rejected(Rejection::LicenseExpired),
            StatusCode::LicenseExpiredInet => Self::Rejected(Rejection::LicenseExpiredNetwork),
            StatusCode::BufferSize => {
                Self::Protocol("server reported an undersized response buffer".to_string())
            }
            StatusCode::MetadataKeyNotFound => Self::Rejected(Rejection::MetadataKeyNotFound),
            StatusCode::Server => Self::Rejected(Rejection::Server),
            StatusCode::Client => Self::Rejected(Rejection::Client),
            StatusCode::Unknown(code) => Self::Rejected(Rejection::Other(code)),
        };
        Some(err)
    }

    /// Returns the broad classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentity(_)
            | Self::DescriptorUnreadable { .. }
            | Self::IdentityAlreadyBound
            | Self::InvalidHandle
            | Self::InvalidEndpoint(_)
            | Self::EndpointLocked
            | Self::NotConfigured(_)
            | Self::NoActiveLease
            | Self::InvalidConfig(_)
            | Self::Serialization(_) => ErrorKind::Configuration,
            Self::Rejected(_) | Self::Protocol(_) => ErrorKind::ServerRejection,
            Self::ClockTampered(_) => ErrorKind::TimeIntegrity,
            Self::Network(_) | Self::Timeout => ErrorKind::TransientNetwork,
            Self::BufferTooSmall { .. } => ErrorKind::Buffer,
        }
    }

    /// Returns true if renewal may retry after this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientNetwork
    }

    /// Returns the expiry reason reported when a renewal fails permanently
    /// with this error.
    #[must_use]
    pub fn expiry_reason(&self) -> ExpiryReason {
        match self {
            Self::Rejected(Rejection::LicenseExpired) => ExpiryReason::LeaseExpiredNormal,
            Self::Rejected(Rejection::LicenseExpiredNetwork) => ExpiryReason::LeaseExpiredNetwork,
            Self::ClockTampered(ClockSide::Server) => ExpiryReason::ServerClockTampered,
            Self::ClockTampered(ClockSide::Client) => ExpiryReason::ClientClockTampered,
            Self::Network(_) | Self::Timeout => ExpiryReason::LeaseExpiredNetwork,
            _ => ExpiryReason::Other,
        }
    }
}
