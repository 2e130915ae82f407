//! Authenticated client for OCI container registries
//!
//! [`RegistryClient`] resolves a credential once, from a JSON key file or the
//! host keychain, and exposes a handful of registry operations on top of an
//! OCI distribution transport:
//!
//! ```rust,no_run
//! use registry_client::{ClientOptions, RegistryClient};
//!
//! # async fn run() -> registry_client::Result<()> {
//! let client = RegistryClient::new("gcr.io/my-project", &ClientOptions::default())?;
//! if client.ref_exists("gcr.io/my-project/app:v1").await? {
//!     client.retag("gcr.io/my-project/app:v1", "gcr.io/my-project/app:stable").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod image;
pub mod reference;
pub mod settings;
pub mod transport;

pub use auth::{AuthTarget, Credential, CredentialResolver, DockerKeychain};
pub use client::RegistryClient;
pub use error::{
    AuthError, KeychainError, Operation, RegistryError, Result, TransportError, TransportErrorKind,
};
pub use image::{ConfigFile, Descriptor};
pub use reference::{ImageReference, TagReference};
pub use settings::{ClientOptions, Settings, TransportOptions};
pub use transport::{
    MemoryTransport, OciTransport, RegistryTransport, RemoteImage, RemoteManifest,
};
