//! Wire status codes and expiry reasons.
//!
//! Status codes are the numeric values the license server returns in every
//! response. They are kept numerically stable so that existing servers can
//! be spoken to without translation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A status code carried in a server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum StatusCode {
    /// Success.
    Ok,
    /// Generic failure.
    Fail,
    /// The product id is incorrect.
    ProductId,
    /// Invalid or missing callback.
    Callback,
    /// Invalid handle.
    Handle,
    /// Missing or invalid server address.
    ServerAddress,
    /// System time on the server machine has been tampered with.
    ServerTime,
    /// System time on the client machine has been tampered with.
    Time,
    /// Network failure while reaching the server.
    Inet,
    /// No free license is available.
    NoFreeLicense,
    /// A license has already been leased for this handle.
    LicenseExists,
    /// The lease expired, e.g. the seat was taken by another client.
    LicenseExpired,
    /// The lease expired because renewals failed with network errors.
    LicenseExpiredInet,
    /// The result buffer was too small.
    BufferSize,
    /// The metadata key does not exist.
    MetadataKeyNotFound,
    /// The product version does not match the server's product.
    ProductVersion,
    /// Server error.
    Server,
    /// Client error.
    Client,
    /// A code this client does not know.
    Unknown(u32),
}

impl StatusCode {
    /// Returns the numeric wire value.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::Fail => 1,
            Self::ProductId => 40,
            Self::Callback => 41,
            Self::Handle => 42,
            Self::ServerAddress => 43,
            Self::ServerTime => 44,
            Self::Time => 45,
            Self::Inet => 46,
            Self::NoFreeLicense => 47,
            Self::LicenseExists => 48,
            Self::LicenseExpired => 49,
            Self::LicenseExpiredInet => 50,
            Self::BufferSize => 51,
            Self::MetadataKeyNotFound => 52,
            Self::ProductVersion => 53,
            Self::Server => 70,
            Self::Client => 71,
            Self::Unknown(code) => *code,
        }
    }

    /// Returns true for [`StatusCode::Ok`].
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Fail,
            40 => Self::ProductId,
            41 => Self::Callback,
            42 => Self::Handle,
            43 => Self::ServerAddress,
            44 => Self::ServerTime,
            45 => Self::Time,
            46 => Self::Inet,
            47 => Self::NoFreeLicense,
            48 => Self::LicenseExists,
            49 => Self::LicenseExpired,
            50 => Self::LicenseExpiredInet,
            51 => Self::BufferSize,
            52 => Self::MetadataKeyNotFound,
            53 => Self::ProductVersion,
            70 => Self::Server,
            71 => Self::Client,
            other => Self::Unknown(other),
        }
    }
}

impl From<StatusCode> for u32 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", self.code())
    }
}

/// Why a lease left the `Leased` state on its own.
///
/// Delivered to the host's status callback exactly once per expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// The server revoked the lease or it lapsed with no further detail.
    LeaseExpiredNormal,
    /// Renewals kept failing with network errors past the grace window.
    LeaseExpiredNetwork,
    /// The server's system clock was tampered with.
    ServerClockTampered,
    /// This machine's system clock was tampered with.
    ClientClockTampered,
    /// Any other permanent renewal failure.
    Other,
}

impl ExpiryReason {
    /// Returns the wire status code that corresponds to this reason.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::LeaseExpiredNormal => StatusCode::LicenseExpired,
            Self::LeaseExpiredNetwork => StatusCode::LicenseExpiredInet,
            Self::ServerClockTampered => StatusCode::ServerTime,
            Self::ClientClockTampered => StatusCode::Time,
            Self::Other => StatusCode::Fail,
        }
    }

    /// Returns a human-readable explanation suitable for a status line.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::LeaseExpiredNormal => "The lease expired before it could be renewed.",
            Self::LeaseExpiredNetwork => "The lease expired due to network connection failure.",
            Self::ServerClockTampered => {
                "The lease expired because the server system time was modified."
            }
            Self::ClientClockTampered => {
                "The lease expired because the client system time was modified."
            }
            Self::Other => "The lease expired due to some other reason.",
        }
    }
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
