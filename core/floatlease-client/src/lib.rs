//! Floating license lease client.
//!
//! A [`LeaseClient`] binds one product identity to a server handle, leases
//! a seat, keeps it alive from a background renewal task, and tells the
//! host application when the lease is lost.
//!
//! # Lifecycle
//!
//! ```text
//! bind_identity + configure_endpoint ─▶ acquire ─▶ (renewal ticks) ─▶ release
//!                                                        │
//!                                                        └─▶ expiry ─▶ callback
//! ```
//!
//! # Components
//!
//! - **Config**: [`LeaseConfig`] timing and shutdown settings
//! - **Identity**: [`IdentityBinder`], set-once identity binding
//! - **State**: [`LeaseState`] transition table
//! - **Renewal**: background ticks and the [`GraceWindow`] for transient failures
//! - **Dispatch**: inline or [`ChannelDispatch`] delivery of expiry notifications

pub mod client;
pub mod config;
pub mod dispatch;
pub mod identity;
pub mod renewal;
pub mod state;

pub use client::{AcquireOutcome, LeaseClient, LeaseInfo};
pub use config::LeaseConfig;
pub use dispatch::{
    ChannelDispatch, DispatchQueue, InlineDispatch, Notification, StatusCallback, StatusDispatch,
};
pub use identity::IdentityBinder;
pub use renewal::{GraceWindow, TickOutcome};
pub use state::{LeaseEvent, LeaseState};

pub use floatlease_transport::global_cleanup;
pub use floatlease_types::{
    ExpiryReason, Handle, Identity, IdentitySource, LeaseError, LeaseResult, ServerEndpoint,
};
