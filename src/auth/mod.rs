//! Credential resolution for registry clients
//!
//! A client resolves exactly one [`Credential`] when it is constructed, either
//! from a static JSON key file or from the host keychain.

pub mod credentials;
pub mod keychain;

pub use credentials::{
    resolve_credential, AuthTarget, Credential, CredentialResolver, JSON_KEY_USERNAME,
};
pub use keychain::DockerKeychain;
