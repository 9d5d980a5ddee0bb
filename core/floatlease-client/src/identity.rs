//! Identity binding.
//!
//! A client binds exactly one identity. The identity source can be fixed
//! up front with [`IdentityBinder::set_source`]; the version is supplied
//! later, at bind time.

use floatlease_types::{
    Handle, Identity, IdentitySource, LeaseError, LeaseResult, ProductDescriptor,
};
use tracing::debug;

/// Tracks the identity source and the identity bound to the handle.
#[derive(Debug, Default)]
pub struct IdentityBinder {
    source: Option<IdentitySource>,
    descriptor: Option<ProductDescriptor>,
    bound: Option<(Identity, Handle)>,
}

impl IdentityBinder {
    /// Creates an empty binder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes where the identity comes from. Descriptor files are read here.
    ///
    /// Setting the same source again is a no-op.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::IdentityAlreadyBound`] if a different source is set or
    ///   the bound identity does not come from `source`
    /// - [`LeaseError::InvalidIdentity`] for a malformed product id or empty descriptor
    /// - [`LeaseError::DescriptorUnreadable`] if the descriptor cannot be read
    pub fn set_source(&mut self, source: IdentitySource) -> LeaseResult<()> {
        if let Some(current) = &self.source {
            return if *current == source {
                Ok(())
            } else {
                Err(LeaseError::IdentityAlreadyBound)
            };
        }
        if let Some((identity, _)) = &self.bound {
            if !identity.matches_source(&source) {
                return Err(LeaseError::IdentityAlreadyBound);
            }
        }

        match &source {
            IdentitySource::ProductId(id) => {
                Identity::product(id)?;
            }
            IdentitySource::ProductFile(path) => {
                let descriptor = ProductDescriptor::load(path)?;
                debug!("Loaded product descriptor {}", descriptor.fingerprint());
                self.descriptor = Some(descriptor);
            }
        }
        self.source = Some(source);
        Ok(())
    }

    /// The configured source, if any.
    pub fn source(&self) -> Option<&IdentitySource> {
        self.source.as_ref()
    }

    /// Builds the identity for the configured source and a version.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::NotConfigured`] without a source, and
    /// [`LeaseError::InvalidIdentity`] for a bad version (descriptor mode
    /// requires a GUID).
    pub fn resolve(&self, version: Option<&str>) -> LeaseResult<Identity> {
        match (&self.source, &self.descriptor, version) {
            (None, _, _) => Err(LeaseError::NotConfigured("identity source")),
            (Some(IdentitySource::ProductId(id)), _, None) => Identity::product(id),
            (Some(IdentitySource::ProductId(id)), _, Some(v)) => {
                Identity::product_with_version(id, v)
            }
            (Some(IdentitySource::ProductFile(_)), Some(descriptor), Some(v)) => {
                Identity::descriptor(descriptor.clone(), v)
            }
            (Some(source @ IdentitySource::ProductFile(_)), _, _) => {
                Identity::resolve(source, version)
            }
        }
    }

    /// Checks whether `identity` may be bound.
    ///
    /// Returns the cached handle if the same identity is already bound.
    ///
    /// # Errors
    ///
    /// - [`LeaseError::InvalidIdentity`] if it does not match the configured source
    /// - [`LeaseError::IdentityAlreadyBound`] if a different identity is bound
    pub fn admit(&self, identity: &Identity) -> LeaseResult<Option<Handle>> {
        if let Some(source) = &self.source {
            if !identity.matches_source(source) {
                return Err(LeaseError::InvalidIdentity(format!(
                    "identity {identity} does not match the configured {} source",
                    source.mode()
                )));
            }
        }
        match &self.bound {
            Some((bound, handle)) if bound == identity => Ok(Some(*handle)),
            Some(_) => Err(LeaseError::IdentityAlreadyBound),
            None => Ok(None),
        }
    }

    /// Records the handle the transport assigned.
    pub fn record(&mut self, identity: Identity, handle: Handle) {
        debug!("Bound identity {} to handle {}", identity, handle);
        self.bound = Some((identity, handle));
    }

    /// The bound identity.
    pub fn identity(&self) -> Option<&Identity> {
        self.bound.as_ref().map(|(identity, _)| identity)
    }

    /// The bound handle.
    pub fn handle(&self) -> Option<Handle> {
        self.bound.as_ref().map(|(_, handle)| *handle)
    }
}
