use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Errors returned by [`RegistryClient`](crate::RegistryClient) operations.
///
/// Every variant carries the reference(s) the failing call was made with, so
/// callers can report errors without threading extra context around.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Credential resolution failed while constructing the client.
    #[error("failed to init authenticator")]
    Auth(#[from] AuthError),

    #[error("failed to parse image reference {reference}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("failed to create tag reference {reference}: {reason}")]
    InvalidTag { reference: String, reason: String },

    #[error("failed to {operation} for image {reference}")]
    Transport {
        operation: Operation,
        reference: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to create tag (from {existing} to {new})")]
    Retag {
        existing: String,
        new: String,
        #[source]
        source: TransportError,
    },
}

impl RegistryError {
    /// Returns the transport failure behind this error, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            RegistryError::Transport { source, .. } | RegistryError::Retag { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            RegistryError::InvalidReference { .. } | RegistryError::InvalidTag { .. }
        )
    }
}

/// The remote call an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Exists,
    Head,
    Inspect,
    Retag,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Exists => "check existence on remote",
            Operation::Head => "get head from remote",
            Operation::Inspect => "get image details from remote",
            Operation::Retag => "get reference from remote",
        };
        f.write_str(s)
    }
}

/// Credential resolution failures. Always fatal to client construction.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("registry address must not be empty")]
    EmptyAddress,

    #[error("failed to resolve authenticator using json key at {}", path.display())]
    ReadKeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to resolve authenticator using default keychain for {host}")]
    Keychain {
        host: String,
        #[source]
        source: KeychainError,
    },
}

/// Failures of the host keychain (docker/podman auth files and credential helpers).
#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("failed to read auth file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse auth file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid auth entry for {host}: {reason}")]
    InvalidAuth { host: String, reason: String },

    #[error("credential helper docker-credential-{helper} failed: {reason}")]
    Helper { helper: String, reason: String },
}

/// Classification of a failed transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The registry answered that the manifest or repository does not exist.
    NotFound,
    Unauthorized,
    Network,
    /// The registry answered, but the payload could not be decoded.
    Decode,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::NotFound => "not found",
            TransportErrorKind::Unauthorized => "unauthorized",
            TransportErrorKind::Network => "network error",
            TransportErrorKind::Decode => "decode error",
            TransportErrorKind::Other => "registry error",
        };
        f.write_str(s)
    }
}

/// An error reported by a [`RegistryTransport`](crate::transport::RegistryTransport).
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == TransportErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_transport_error_display_names_operation_and_reference() {
        let err = RegistryError::Transport {
            operation: Operation::Head,
            reference: "registry.example/app:v1".to_string(),
            source: TransportError::not_found("manifest unknown"),
        };

        assert_eq!(
            err.to_string(),
            "failed to get head from remote for image registry.example/app:v1"
        );
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("not found: manifest unknown".to_string())
        );
        assert!(err.transport_error().is_some_and(|e| e.is_not_found()));
    }

    #[test]
    fn test_retag_error_names_both_references() {
        let err = RegistryError::Retag {
            existing: "registry.example/app:v1".to_string(),
            new: "registry.example/app:v2".to_string(),
            source: TransportError::new(TransportErrorKind::Unauthorized, "denied"),
        };

        let message = err.to_string();
        assert!(message.contains("registry.example/app:v1"));
        assert!(message.contains("registry.example/app:v2"));
        assert!(!err.is_reference_error());
    }

    #[test]
    fn test_key_file_error_mentions_path() {
        let err = AuthError::ReadKeyFile {
            path: PathBuf::from("/secrets/key.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };

        assert!(err.to_string().contains("/secrets/key.json"));
    }
}
