use std::fmt;

use oci_distribution::Reference;

use crate::error::{RegistryError, Result};

/// Parsed OCI image reference, either a tag or a digest form
///
/// Parsing follows the distribution reference grammar implemented by
/// `oci-distribution`, so `nginx` expands to `docker.io/library/nginx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    input: String,
    inner: Reference,
}

impl ImageReference {
    pub fn parse(image_ref: &str) -> Result<Self> {
        let inner =
            Reference::try_from(image_ref).map_err(|e| RegistryError::InvalidReference {
                reference: image_ref.to_string(),
                reason: e.to_string(),
            })?;

        if inner.repository().chars().any(|c| c.is_ascii_uppercase()) {
            return Err(RegistryError::InvalidReference {
                reference: image_ref.to_string(),
                reason: "repository name must be lowercase".to_string(),
            });
        }

        Ok(Self {
            input: image_ref.to_string(),
            inner,
        })
    }

    /// The string this reference was parsed from.
    pub fn as_str(&self) -> &str {
        &self.input
    }

    pub fn registry(&self) -> &str {
        self.inner.registry()
    }

    pub fn repository(&self) -> &str {
        self.inner.repository()
    }

    pub fn tag(&self) -> Option<&str> {
        self.inner.tag()
    }

    pub fn digest(&self) -> Option<&str> {
        self.inner.digest()
    }

    pub fn is_digest(&self) -> bool {
        self.inner.digest().is_some()
    }

    /// The manifest identifier a registry resolves this reference by:
    /// the digest when pinned, otherwise the tag (`latest` when omitted).
    pub fn identifier(&self) -> &str {
        self.inner
            .digest()
            .or_else(|| self.inner.tag())
            .unwrap_or("latest")
    }

    /// Fully qualified form, e.g. `docker.io/library/nginx:latest`.
    pub fn whole(&self) -> String {
        self.inner.whole()
    }

    pub(crate) fn as_oci(&self) -> &Reference {
        &self.inner
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.input)
    }
}

/// A reference that must name a tag, never a digest
///
/// Used as the target of a retag, where the registry is asked to move a
/// mutable pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReference(ImageReference);

impl TagReference {
    pub fn parse(tag_ref: &str) -> Result<Self> {
        let reference = ImageReference::parse(tag_ref).map_err(|e| match e {
            RegistryError::InvalidReference { reference, reason } => {
                RegistryError::InvalidTag { reference, reason }
            }
            other => other,
        })?;

        if reference.is_digest() {
            return Err(RegistryError::InvalidTag {
                reference: tag_ref.to_string(),
                reason: "digest references cannot be used as a tag".to_string(),
            });
        }

        Ok(Self(reference))
    }

    pub fn tag(&self) -> &str {
        self.0.tag().unwrap_or("latest")
    }

    pub fn reference(&self) -> &ImageReference {
        &self.0
    }
}

impl fmt::Display for TagReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registry host portion of a client address: everything before the first `/`.
pub fn registry_host(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_parse_tag_reference() {
        let reference = ImageReference::parse("registry.example/team/app:v1").unwrap();

        assert_eq!(reference.registry(), "registry.example");
        assert_eq!(reference.repository(), "team/app");
        assert_eq!(reference.tag(), Some("v1"));
        assert!(!reference.is_digest());
        assert_eq!(reference.identifier(), "v1");
        assert_eq!(reference.to_string(), "registry.example/team/app:v1");
    }

    #[test]
    fn test_parse_digest_reference() {
        let input = format!("registry.example/app@{}", DIGEST);
        let reference = ImageReference::parse(&input).unwrap();

        assert!(reference.is_digest());
        assert_eq!(reference.digest(), Some(DIGEST));
        assert_eq!(reference.identifier(), DIGEST);
    }

    #[test]
    fn test_parse_rejects_malformed_reference() {
        for input in ["", "UPPER/case:tag", "registry.example/app:bad tag", "app@sha256:xyz"] {
            let err = ImageReference::parse(input).unwrap_err();
            match err {
                RegistryError::InvalidReference { reference, .. } => assert_eq!(reference, input),
                other => panic!("unexpected error for {:?}: {:?}", input, other),
            }
        }
    }

    #[test]
    fn test_parse_rejects_uppercase_repository() {
        let err = ImageReference::parse("registry.example/Team/app:v1").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidReference { ref reason, .. } if reason.contains("lowercase")
        ));

        let reference = ImageReference::parse("registry.example/team/app:V1").unwrap();
        assert_eq!(reference.tag(), Some("V1"));
    }

    #[test]
    fn test_tag_reference_rejects_digest() {
        let input = format!("registry.example/app@{}", DIGEST);
        let err = TagReference::parse(&input).unwrap_err();

        assert!(matches!(
            err,
            RegistryError::InvalidTag { ref reference, .. } if *reference == input
        ));
    }

    #[test]
    fn test_tag_reference_reports_malformed_input_as_tag_error() {
        let err = TagReference::parse("registry.example/app:bad tag").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTag { .. }));
    }

    #[test]
    fn test_tag_reference_defaults_to_latest() {
        let tag = TagReference::parse("registry.example/app").unwrap();
        assert_eq!(tag.tag(), "latest");
    }

    #[test]
    fn test_registry_host() {
        assert_eq!(registry_host("gcr.io/my-project/images"), "gcr.io");
        assert_eq!(registry_host("localhost:5000"), "localhost:5000");
        assert_eq!(registry_host(""), "");
    }
}
