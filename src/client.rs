use tracing::{debug, info};

use crate::auth::{resolve_credential, AuthTarget, Credential, CredentialResolver, DockerKeychain};
use crate::error::{AuthError, Operation, RegistryError, Result};
use crate::image::{ConfigFile, Descriptor};
use crate::reference::{ImageReference, TagReference};
use crate::settings::{ClientOptions, Settings};
use crate::transport::{OciTransport, RegistryTransport};

/// Client for an authenticated container registry
///
/// The credential is resolved once, when the client is built, and reused by
/// every call. Build a new client to pick up rotated credentials.
pub struct RegistryClient<T = OciTransport> {
    target: AuthTarget,
    credential: Credential,
    transport: T,
}

impl RegistryClient<OciTransport> {
    /// Create a client for `address` (a registry host, optionally followed by a
    /// repository prefix such as `gcr.io/my-project`), resolving credentials
    /// from `options` or the host keychain.
    pub fn new(address: impl Into<String>, options: &ClientOptions) -> Result<Self> {
        Self::with_parts(
            address,
            options,
            &DockerKeychain::from_env(),
            OciTransport::default(),
        )
    }

    /// Create a client configured from loaded [`Settings`].
    pub fn from_settings(address: impl Into<String>, settings: &Settings) -> Result<Self> {
        Self::with_parts(
            address,
            &settings.client,
            &DockerKeychain::from_env(),
            OciTransport::new(&settings.transport),
        )
    }
}

impl<T: RegistryTransport> RegistryClient<T> {
    /// Create a client with an explicit credential resolver and transport.
    pub fn with_parts(
        address: impl Into<String>,
        options: &ClientOptions,
        resolver: &dyn CredentialResolver,
        transport: T,
    ) -> Result<Self> {
        let address = address.into();
        if address.is_empty() {
            return Err(AuthError::EmptyAddress.into());
        }

        let target = AuthTarget::new(address);
        let credential = resolve_credential(&target, options, resolver)?;

        info!(
            registry = %target.address,
            anonymous = credential.is_anonymous(),
            "Initialized registry client"
        );

        Ok(Self {
            target,
            credential,
            transport,
        })
    }

    pub fn address(&self) -> &str {
        &self.target.address
    }

    /// Host portion of the address, used as the keychain lookup key.
    pub fn registry_host(&self) -> &str {
        &self.target.host_key
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch the descriptor (digest, media type, size) of `image_ref`.
    ///
    /// A missing image is an error; use [`ref_exists`](Self::ref_exists) to test
    /// for presence.
    pub async fn head(&self, image_ref: &str) -> Result<Descriptor> {
        let reference = ImageReference::parse(image_ref)?;
        debug!("Getting head for {}", reference);

        self.transport
            .head(&reference, &self.credential)
            .await
            .map_err(|source| RegistryError::Transport {
                operation: Operation::Head,
                reference: image_ref.to_string(),
                source,
            })
    }

    /// Check whether `image_ref` exists on the registry.
    ///
    /// Returns `Ok(false)` only when the registry reports the reference as not
    /// found; any other failure is an error.
    pub async fn ref_exists(&self, image_ref: &str) -> Result<bool> {
        let reference = ImageReference::parse(image_ref)?;
        debug!("Checking existence of {}", reference);

        match self.transport.head(&reference, &self.credential).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!("{} not found on remote", reference);
                Ok(false)
            }
            Err(source) => Err(RegistryError::Transport {
                operation: Operation::Exists,
                reference: image_ref.to_string(),
                source,
            }),
        }
    }

    /// Fetch the image configuration of `image_ref`, similar to what
    /// `docker inspect` prints.
    pub async fn inspect(&self, image_ref: &str) -> Result<ConfigFile> {
        let reference = ImageReference::parse(image_ref)?;
        debug!("Inspecting {}", reference);

        let transport_err = |source| RegistryError::Transport {
            operation: Operation::Inspect,
            reference: image_ref.to_string(),
            source,
        };

        let image = self
            .transport
            .fetch_image(&reference, &self.credential)
            .await
            .map_err(transport_err)?;

        image.config_file().map_err(transport_err)
    }

    /// Create the tag `new_ref` pointing at the image `existing_ref` resolves to.
    ///
    /// `existing_ref` may be a tag or a digest, `new_ref` must be a tag. The
    /// source reference is left untouched.
    pub async fn retag(&self, existing_ref: &str, new_ref: &str) -> Result<()> {
        let reference = ImageReference::parse(existing_ref)?;
        let new_tag = TagReference::parse(new_ref)?;

        let manifest = self
            .transport
            .fetch_manifest(&reference, &self.credential)
            .await
            .map_err(|source| RegistryError::Transport {
                operation: Operation::Retag,
                reference: existing_ref.to_string(),
                source,
            })?;

        self.transport
            .publish_tag(&new_tag, &manifest, &self.credential)
            .await
            .map_err(|source| RegistryError::Retag {
                existing: existing_ref.to_string(),
                new: new_ref.to_string(),
                source,
            })?;

        info!(
            digest = %manifest.digest(),
            "Tagged {} as {}", existing_ref, new_ref
        );
        Ok(())
    }
}
