use std::fmt;

use tracing::debug;

use crate::error::{AuthError, KeychainError};
use crate::reference::registry_host;
use crate::settings::ClientOptions;

/// Username paired with the contents of a JSON key file.
pub const JSON_KEY_USERNAME: &str = "_json_key";

/// Authentication material sent with every registry request of a client
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Anonymous,
    Basic { username: String, password: String },
}

impl Credential {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Credential::Anonymous)
    }
}

// Secrets never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Anonymous => f.write_str("Anonymous"),
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// The registry a credential is being resolved for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTarget {
    /// Registry address as given to the client, e.g. `gcr.io/my-project`
    pub address: String,
    /// Lookup key for keychains, the host portion of `address`
    pub host_key: String,
}

impl AuthTarget {
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        let host_key = registry_host(&address).to_string();
        Self { address, host_key }
    }
}

/// Host-level credential lookup keyed by registry host
///
/// Implementations must not perform registry round trips; resolution happens
/// while a client is being constructed.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, target: &AuthTarget) -> Result<Credential, KeychainError>;
}

/// Resolve the credential a client will use for its whole lifetime.
///
/// A non-empty `json_key_path` wins; otherwise the resolver is asked for the
/// target's host key.
pub fn resolve_credential(
    target: &AuthTarget,
    options: &ClientOptions,
    resolver: &dyn CredentialResolver,
) -> Result<Credential, AuthError> {
    if let Some(path) = options.json_key_path() {
        debug!("Resolving credentials from json key at {}", path.display());
        let key = std::fs::read_to_string(path).map_err(|source| AuthError::ReadKeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(Credential::basic(JSON_KEY_USERNAME, key));
    }

    debug!("Resolving credentials for {} from keychain", target.host_key);
    resolver
        .resolve(target)
        .map_err(|source| AuthError::Keychain {
            host: target.host_key.clone(),
            source,
        })
}
