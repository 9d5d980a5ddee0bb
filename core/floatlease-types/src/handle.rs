//! Opaque server-correlated lease handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle bound to a registered product identity.
///
/// Handles are allocated by the transport when an identity is registered and
/// are carried on every subsequent request. Zero is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u32);

impl Handle {
    /// The reserved invalid handle.
    pub const INVALID: Handle = Handle(0);

    /// Creates a handle from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    /// Returns true unless this is the reserved zero handle.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
