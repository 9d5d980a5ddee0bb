//! Product identities.
//!
//! A client identifies itself to the license server in one of two modes:
//! - a plain product id, optionally qualified by a version identifier
//! - a product descriptor file plus a version GUID
//!
//! The identity is resolved once and exchanged for a [`Handle`](crate::Handle).

use crate::error::{LeaseError, LeaseResult};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Maximum length of a product or version identifier.
const MAX_ID_LEN: usize = 256;

/// Where the client's product identity comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentitySource {
    /// Plain product id as shown in the vendor dashboard.
    ProductId(String),
    /// Path to a product descriptor file shipped with the application.
    ProductFile(PathBuf),
}

impl IdentitySource {
    /// Short name of the identity mode, for logs.
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            Self::ProductId(_) => "product-id",
            Self::ProductFile(_) => "product-file",
        }
    }
}

/// A validated version identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    /// Creates a free-form version identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidIdentity`] if the value is blank, too
    /// long, or contains control characters.
    pub fn new(value: &str) -> LeaseResult<Self> {
        Ok(Self(validate_id("version id", value)?))
    }

    /// Parses a version GUID, normalising it to upper-case hyphenated form.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidIdentity`] if the value is not a GUID.
    pub fn guid(value: &str) -> LeaseResult<Self> {
        let uuid = Uuid::parse_str(value.trim()).map_err(|e| {
            LeaseError::InvalidIdentity(format!("version GUID {value:?} is malformed: {e}"))
        })?;
        Ok(Self(uuid.hyphenated().to_string().to_uppercase()))
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contents of a product descriptor file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductDescriptor {
    /// Where the descriptor was loaded from. Not sent over the wire.
    #[serde(skip)]
    path: PathBuf,
    /// File contents, base64 encoded.
    data: String,
    /// Short stable fingerprint of the contents.
    fingerprint: String,
}

impl ProductDescriptor {
    /// Reads a descriptor from disk.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::DescriptorUnreadable`] on I/O failure and
    /// [`LeaseError::InvalidIdentity`] if the file is empty.
    pub fn load(path: impl AsRef<Path>) -> LeaseResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| LeaseError::DescriptorUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(path, &bytes)
    }

    /// Builds a descriptor from bytes already in memory.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidIdentity`] if `bytes` is empty.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> LeaseResult<Self> {
        let path = path.into();
        if bytes.is_empty() {
            return Err(LeaseError::InvalidIdentity(format!(
                "product descriptor {} is empty",
                path.display()
            )));
        }

        let hash = Sha256::digest(bytes);
        Ok(Self {
            path,
            data: BASE64.encode(bytes),
            fingerprint: BASE64.encode(&hash[..12]),
        })
    }

    /// Returns the path the descriptor was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the base64-encoded contents.
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Returns the content fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// A resolved product identity, ready to be registered for a handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Identity {
    /// Plain product id mode.
    Product {
        product_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<VersionId>,
    },
    /// Product descriptor mode.
    Descriptor {
        descriptor: ProductDescriptor,
        version: VersionId,
    },
}

impl Identity {
    /// Plain product id with no version qualifier.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidIdentity`] if the product id is malformed.
    pub fn product(product_id: &str) -> LeaseResult<Self> {
        Ok(Self::Product {
            product_id: validate_id("product id", product_id)?,
            version: None,
        })
    }

    /// Plain product id qualified by a free-form version.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidIdentity`] if either part is malformed.
    pub fn product_with_version(product_id: &str, version: &str) -> LeaseResult<Self> {
        Ok(Self::Product {
            product_id: validate_id("product id", product_id)?,
            version: Some(VersionId::new(version)?),
        })
    }

    /// Descriptor identity with a version GUID.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidIdentity`] if the version is not a GUID.
    pub fn descriptor(descriptor: ProductDescriptor, version: &str) -> LeaseResult<Self> {
        Ok(Self::Descriptor {
            descriptor,
            version: VersionId::guid(version)?,
        })
    }

    /// Loads a descriptor file and pairs it with a version GUID.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`ProductDescriptor::load`] and [`Identity::descriptor`].
    pub fn from_descriptor_file(path: impl AsRef<Path>, version: &str) -> LeaseResult<Self> {
        Self::descriptor(ProductDescriptor::load(path)?, version)
    }

    /// Resolves an identity from a configured source.
    ///
    /// Descriptor mode requires a version; product-id mode accepts one.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::InvalidIdentity`] or [`LeaseError::DescriptorUnreadable`].
    pub fn resolve(source: &IdentitySource, version: Option<&str>) -> LeaseResult<Self> {
        match (source, version) {
            (IdentitySource::ProductId(id), None) => Self::product(id),
            (IdentitySource::ProductId(id), Some(v)) => Self::product_with_version(id, v),
            (IdentitySource::ProductFile(path), Some(v)) => Self::from_descriptor_file(path, v),
            (IdentitySource::ProductFile(_), None) => Err(LeaseError::InvalidIdentity(
                "product-file identities require a version GUID".to_string(),
            )),
        }
    }

    /// Returns true if this identity was produced from the given source.
    #[must_use]
    pub fn matches_source(&self, source: &IdentitySource) -> bool {
        match (self, source) {
            (Self::Product { product_id, .. }, IdentitySource::ProductId(id)) => {
                product_id == id.trim()
            }
            (Self::Descriptor { descriptor, .. }, IdentitySource::ProductFile(path)) => {
                descriptor.path() == path
            }
            _ => false,
        }
    }

    /// Returns the version qualifier, if any.
    #[must_use]
    pub fn version(&self) -> Option<&VersionId> {
        match self {
            Self::Product { version, .. } => version.as_ref(),
            Self::Descriptor { version, .. } => Some(version),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product {
                product_id,
                version: Some(v),
            } => write!(f, "{product_id}@{v}"),
            Self::Product {
                product_id,
                version: None,
            } => f.write_str(product_id),
            Self::Descriptor {
                descriptor,
                version,
            } => write!(f, "descriptor:{}@{version}", descriptor.fingerprint()),
        }
    }
}

fn validate_id(what: &str, value: &str) -> LeaseResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LeaseError::InvalidIdentity(format!("{what} is empty")));
    }
    if trimmed.len() > MAX_ID_LEN {
        return Err(LeaseError::InvalidIdentity(format!(
            "{what} exceeds {MAX_ID_LEN} bytes"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(LeaseError::InvalidIdentity(format!(
            "{what} contains control characters"
        )));
    }
    Ok(trimmed.to_string())
}
