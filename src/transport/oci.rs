use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use oci_distribution::{
    client::{ClientConfig, ClientProtocol},
    errors::{OciDistributionError, OciEnvelope, OciErrorCode},
    secrets::RegistryAuth,
    Client, Reference, RegistryOperation,
};
use reqwest::header::HeaderValue;
use tracing::debug;

use super::{RegistryTransport, RemoteImage, RemoteManifest};
use crate::auth::Credential;
use crate::error::{TransportError, TransportErrorKind};
use crate::image::{manifest_media_type, Descriptor, MANIFEST_MEDIA_TYPES};
use crate::reference::{ImageReference, TagReference};
use crate::settings::TransportOptions;

/// Transport backed by the `oci-distribution` client
pub struct OciTransport {
    client: Client,
    request_timeout: Option<Duration>,
}

impl OciTransport {
    pub fn new(options: &TransportOptions) -> Self {
        let protocol = if options.insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(options.insecure_registries.clone())
        };

        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });

        Self {
            client,
            request_timeout: options.request_timeout(),
        }
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, OciDistributionError>> + Send,
    {
        let result = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut).await.map_err(|_| {
                TransportError::new(
                    TransportErrorKind::Network,
                    format!("registry did not respond within {}s", timeout.as_secs()),
                )
            })?,
            None => fut.await,
        };

        result.map_err(classify_error)
    }

    async fn pull_raw_manifest(
        &self,
        reference: &ImageReference,
        auth: &RegistryAuth,
    ) -> Result<RemoteManifest, TransportError> {
        let (raw, digest) = self
            .call(
                self.client
                    .pull_manifest_raw(reference.as_oci(), auth, MANIFEST_MEDIA_TYPES),
            )
            .await?;
        let raw = raw.to_vec();

        Ok(RemoteManifest {
            descriptor: Descriptor {
                media_type: manifest_media_type(&raw),
                digest,
                size: raw.len() as u64,
            },
            raw,
        })
    }
}

impl Default for OciTransport {
    fn default() -> Self {
        Self::new(&TransportOptions::default())
    }
}

#[async_trait]
impl RegistryTransport for OciTransport {
    async fn head(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<Descriptor, TransportError> {
        debug!("Fetching manifest descriptor for {}", reference.whole());
        let auth = registry_auth(credential);
        let manifest = self.pull_raw_manifest(reference, &auth).await?;
        Ok(manifest.descriptor)
    }

    async fn fetch_manifest(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<RemoteManifest, TransportError> {
        debug!("Fetching manifest {}", reference.whole());
        let auth = registry_auth(credential);
        self.pull_raw_manifest(reference, &auth).await
    }

    async fn fetch_image(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<RemoteImage, TransportError> {
        debug!("Fetching image {}", reference.whole());
        let auth = registry_auth(credential);
        let manifest = self.pull_raw_manifest(reference, &auth).await?;

        // Pin to the fetched digest; image indexes resolve to the platform manifest.
        let pinned = pinned_reference(reference, manifest.digest());
        let (_, _, config) = self
            .call(self.client.pull_manifest_and_config(&pinned, &auth))
            .await?;

        Ok(RemoteImage {
            manifest,
            config: config.into_bytes(),
        })
    }

    async fn publish_tag(
        &self,
        tag: &TagReference,
        manifest: &RemoteManifest,
        credential: &Credential,
    ) -> Result<(), TransportError> {
        let target = tag.reference().as_oci();
        debug!("Publishing {} as {}", manifest.digest(), target.whole());

        let auth = registry_auth(credential);
        self.call(async {
            self.client
                .auth(target, &auth, RegistryOperation::Push)
                .await
                .map(|_| ())
        })
        .await?;

        let media_type = &manifest.descriptor.media_type;
        let content_type = HeaderValue::from_str(media_type).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Other,
                format!("invalid manifest media type {}: {}", media_type, e),
            )
        })?;

        self.call(
            self.client
                .push_manifest_raw(target, manifest.raw.clone(), content_type),
        )
        .await?;

        Ok(())
    }
}

fn registry_auth(credential: &Credential) -> RegistryAuth {
    match credential {
        Credential::Anonymous => RegistryAuth::Anonymous,
        Credential::Basic { username, password } => {
            RegistryAuth::Basic(username.clone(), password.clone())
        }
    }
}

fn pinned_reference(reference: &ImageReference, digest: &str) -> Reference {
    Reference::with_digest(
        reference.registry().to_string(),
        reference.repository().to_string(),
        digest.to_string(),
    )
}

fn classify_error(err: OciDistributionError) -> TransportError {
    let kind = match &err {
        OciDistributionError::ImageManifestNotFoundError(_) => TransportErrorKind::NotFound,
        OciDistributionError::RegistryError { envelope, .. } => classify_envelope(envelope),
        OciDistributionError::ServerError { code, .. } => classify_status(*code),
        OciDistributionError::UnauthorizedError { .. }
        | OciDistributionError::AuthenticationFailure(_) => TransportErrorKind::Unauthorized,
        OciDistributionError::RequestError(_) => TransportErrorKind::Network,
        _ => TransportErrorKind::Other,
    };

    TransportError::new(kind, err.to_string())
}

/// Classify an OCI error envelope by its error codes.
fn classify_envelope(envelope: &OciEnvelope) -> TransportErrorKind {
    let codes = || envelope.errors.iter().map(|e| &e.code);

    if codes().any(|code| {
        matches!(
            code,
            OciErrorCode::ManifestUnknown | OciErrorCode::NameUnknown
        )
    }) {
        TransportErrorKind::NotFound
    } else if codes().any(|code| {
        matches!(code, OciErrorCode::Unauthorized | OciErrorCode::Denied)
    }) {
        TransportErrorKind::Unauthorized
    } else {
        TransportErrorKind::Other
    }
}

fn classify_status(code: u16) -> TransportErrorKind {
    match code {
        404 => TransportErrorKind::NotFound,
        401 | 403 => TransportErrorKind::Unauthorized,
        _ => TransportErrorKind::Other,
    }
}
