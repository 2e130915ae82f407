//! Registry transports
//!
//! The registry client never speaks the distribution protocol itself. It hands
//! parsed references and its credential to a [`RegistryTransport`].

pub mod memory;
pub mod oci;

use async_trait::async_trait;

use crate::auth::Credential;
use crate::error::{TransportError, TransportErrorKind};
use crate::image::{ConfigFile, Descriptor};
use crate::reference::{ImageReference, TagReference};

pub use memory::MemoryTransport;
pub use oci::OciTransport;

/// Remote operations a registry client delegates to
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Metadata-only lookup. A missing manifest must be reported with
    /// [`TransportErrorKind::NotFound`].
    async fn head(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<Descriptor, TransportError>;

    /// Fetch the manifest of a reference without its configuration.
    async fn fetch_manifest(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<RemoteManifest, TransportError>;

    /// Fetch the manifest and the image configuration it points at. The
    /// configuration must belong to the returned manifest even if the tag
    /// moves while fetching.
    async fn fetch_image(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<RemoteImage, TransportError>;

    /// Point `tag` at `manifest`.
    async fn publish_tag(
        &self,
        tag: &TagReference,
        manifest: &RemoteManifest,
        credential: &Credential,
    ) -> Result<(), TransportError>;
}

/// A manifest fetched from a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteManifest {
    pub descriptor: Descriptor,
    /// Bytes exactly as served, so republishing keeps the digest
    pub raw: Vec<u8>,
}

impl RemoteManifest {
    pub fn digest(&self) -> &str {
        &self.descriptor.digest
    }
}

/// An image fetched from a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImage {
    pub manifest: RemoteManifest,
    /// Raw image configuration blob
    pub config: Vec<u8>,
}

impl RemoteImage {
    pub fn digest(&self) -> &str {
        self.manifest.digest()
    }

    /// Decode the image configuration.
    pub fn config_file(&self) -> Result<ConfigFile, TransportError> {
        serde_json::from_slice(&self.config).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Decode,
                format!("invalid image config for {}: {}", self.digest(), e),
            )
        })
    }
}
