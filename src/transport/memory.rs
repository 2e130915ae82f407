use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{RegistryTransport, RemoteImage, RemoteManifest};
use crate::auth::Credential;
use crate::error::{Result, TransportError, TransportErrorKind};
use crate::image::{manifest_media_type, Descriptor};
use crate::reference::{ImageReference, TagReference};

/// In-process registry for tests
///
/// Stores manifests by digest and tags per repository. Every trait call is
/// counted and the credential it was made with is recorded.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<State>,
    calls: AtomicUsize,
}

#[derive(Default)]
struct State {
    manifests: HashMap<String, StoredManifest>,
    tags: HashMap<(String, String), String>,
    failure: Option<TransportError>,
    credentials: Vec<Credential>,
}

#[derive(Clone)]
struct StoredManifest {
    raw: Vec<u8>,
    media_type: String,
    config: Vec<u8>,
}

fn repository_key(reference: &ImageReference) -> String {
    format!("{}/{}", reference.registry(), reference.repository())
}

pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an image and tag it as `image_ref`. Returns the manifest digest.
    pub fn push_image(&self, image_ref: &str, manifest: &[u8], config: &[u8]) -> Result<String> {
        let tag = TagReference::parse(image_ref)?;
        let digest = sha256_digest(manifest);

        let mut state = self.state();
        state.manifests.insert(
            digest.clone(),
            StoredManifest {
                raw: manifest.to_vec(),
                media_type: manifest_media_type(manifest),
                config: config.to_vec(),
            },
        );
        state.tags.insert(
            (repository_key(tag.reference()), tag.tag().to_string()),
            digest.clone(),
        );
        Ok(digest)
    }

    /// Make every following call fail with `error`, or clear a previous failure.
    pub fn set_failure(&self, error: Option<TransportError>) {
        self.state().failure = error;
    }

    /// Number of transport calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Credentials presented with each call, in order.
    pub fn credentials(&self) -> Vec<Credential> {
        self.state().credentials.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, credential: &Credential) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.credentials.push(credential.clone());
        match &state.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn resolve(
        &self,
        reference: &ImageReference,
    ) -> Result<(String, StoredManifest), TransportError> {
        let state = self.state();

        let digest = match reference.digest() {
            Some(digest) => digest.to_string(),
            None => state
                .tags
                .get(&(repository_key(reference), reference.identifier().to_string()))
                .cloned()
                .ok_or_else(|| {
                    TransportError::not_found(format!("MANIFEST_UNKNOWN: {}", reference.whole()))
                })?,
        };

        state
            .manifests
            .get(&digest)
            .cloned()
            .map(|manifest| (digest.clone(), manifest))
            .ok_or_else(|| TransportError::not_found(format!("MANIFEST_UNKNOWN: {}", digest)))
    }
}

#[async_trait]
impl RegistryTransport for MemoryTransport {
    async fn head(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<Descriptor, TransportError> {
        self.begin(credential)?;
        let (digest, manifest) = self.resolve(reference)?;

        Ok(Descriptor {
            media_type: manifest.media_type,
            digest,
            size: manifest.raw.len() as u64,
        })
    }

    async fn fetch_manifest(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<RemoteManifest, TransportError> {
        self.begin(credential)?;
        let (digest, manifest) = self.resolve(reference)?;

        Ok(RemoteManifest {
            descriptor: Descriptor {
                media_type: manifest.media_type,
                digest,
                size: manifest.raw.len() as u64,
            },
            raw: manifest.raw,
        })
    }

    async fn fetch_image(
        &self,
        reference: &ImageReference,
        credential: &Credential,
    ) -> Result<RemoteImage, TransportError> {
        self.begin(credential)?;
        let (digest, manifest) = self.resolve(reference)?;

        Ok(RemoteImage {
            manifest: RemoteManifest {
                descriptor: Descriptor {
                    media_type: manifest.media_type,
                    digest,
                    size: manifest.raw.len() as u64,
                },
                raw: manifest.raw,
            },
            config: manifest.config,
        })
    }

    async fn publish_tag(
        &self,
        tag: &TagReference,
        manifest: &RemoteManifest,
        credential: &Credential,
    ) -> Result<(), TransportError> {
        self.begin(credential)?;

        let digest = sha256_digest(&manifest.raw);
        if digest != manifest.digest() {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                format!(
                    "DIGEST_INVALID: manifest digest {} does not match {}",
                    digest,
                    manifest.digest()
                ),
            ));
        }

        let mut state = self.state();
        let Some(stored) = state.manifests.get(&digest).cloned() else {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                format!("MANIFEST_BLOB_UNKNOWN: blobs of {} are not present", digest),
            ));
        };
        state.manifests.insert(
            digest.clone(),
            StoredManifest {
                media_type: manifest.descriptor.media_type.clone(),
                ..stored
            },
        );
        state.tags.insert(
            (repository_key(tag.reference()), tag.tag().to_string()),
            digest,
        );
        Ok(())
    }
}
