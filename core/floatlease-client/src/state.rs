//! Client-visible lease lifecycle.
//!
//! ```text
//! Unconfigured ──Configured──▶ Configured ──Acquired──▶ Leased ──Expired──▶ Expired
//!                                                         │                   │
//!                                                         └──Released──▶ Released ◀┘
//! ```
//!
//! `Expired` and `Released` go straight back to `Leased` on a successful
//! acquire; `Configured` and `Unconfigured` are never re-entered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a lease client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    /// Identity or endpoint still missing.
    Unconfigured,
    /// Ready to acquire.
    Configured,
    /// Holding a seat; the renewal scheduler is running.
    Leased,
    /// The lease was lost; a fresh acquire is required.
    Expired,
    /// The lease was given back.
    Released,
}

/// Something that happened to the lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseEvent {
    /// Identity bound and endpoint set.
    Configured,
    /// The server granted a seat.
    Acquired,
    /// The server refused or could not be reached on acquire.
    AcquireFailed,
    /// A renewal tick succeeded.
    Renewed,
    /// A renewal tick failed transiently within the grace window.
    RenewalDegraded,
    /// A renewal failed permanently or the grace window ran out.
    Expired,
    /// The caller released the lease.
    Released,
}

impl LeaseState {
    /// Applies an event, returning the next state, or `None` if the event
    /// is not valid in this state.
    #[must_use]
    pub fn on(self, event: LeaseEvent) -> Option<LeaseState> {
        use LeaseEvent as E;
        use LeaseState as S;

        match (self, event) {
            (S::Unconfigured, E::Configured) => Some(S::Configured),
            (S::Configured | S::Expired | S::Released, E::Configured) => Some(self),
            (S::Configured | S::Expired | S::Released, E::Acquired) => Some(S::Leased),
            (S::Configured | S::Expired | S::Released, E::AcquireFailed) => Some(self),
            (S::Leased, E::Renewed | E::RenewalDegraded) => Some(S::Leased),
            (S::Leased, E::Expired) => Some(S::Expired),
            (S::Leased | S::Expired, E::Released) => Some(S::Released),
            _ => None,
        }
    }

    /// True while a seat is held.
    #[must_use]
    pub fn is_leased(self) -> bool {
        self == Self::Leased
    }

    /// True if `acquire()` may contact the server from this state.
    #[must_use]
    pub fn can_acquire(self) -> bool {
        matches!(self, Self::Configured | Self::Expired | Self::Released)
    }

    /// True if `release()` has something to release.
    #[must_use]
    pub fn can_release(self) -> bool {
        matches!(self, Self::Leased | Self::Expired)
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Leased => "leased",
            Self::Expired => "expired",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}
