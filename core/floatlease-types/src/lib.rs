//! Core type definitions for floating license leasing.
//!
//! This crate defines the types shared by the transport and the lease
//! client:
//! - Server-assigned lease handles
//! - Product identities (plain product id or product descriptor file)
//! - License server endpoints
//! - Wire status codes and the expiry reasons reported to the host
//! - The lease error taxonomy

mod endpoint;
mod error;
mod handle;
mod identity;
mod status;

pub use endpoint::ServerEndpoint;
pub use error::{ClockSide, ErrorKind, LeaseError, LeaseResult, Rejection};
pub use handle::Handle;
pub use identity::{Identity, IdentitySource, ProductDescriptor, VersionId};
pub use status::{ExpiryReason, StatusCode};
