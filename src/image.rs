//! Remote image metadata: descriptors and the image configuration document

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const OCI_IMAGE_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_IMAGE_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Manifest media types accepted when probing a reference.
pub const MANIFEST_MEDIA_TYPES: &[&str] = &[
    OCI_IMAGE_MANIFEST_MEDIA_TYPE,
    OCI_IMAGE_INDEX_MEDIA_TYPE,
    DOCKER_MANIFEST_MEDIA_TYPE,
    DOCKER_MANIFEST_LIST_MEDIA_TYPE,
];

/// Metadata about a remote manifest, obtainable without fetching layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

/// Media type of a raw manifest, read from its `mediaType` field
///
/// Manifests may omit the field; those are classified by shape, an index has
/// a `manifests` array.
pub fn manifest_media_type(raw: &[u8]) -> String {
    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, rename = "mediaType")]
        media_type: Option<String>,
        #[serde(default)]
        manifests: Option<serde_json::Value>,
    }

    match serde_json::from_slice::<Probe>(raw) {
        Ok(Probe {
            media_type: Some(media_type),
            ..
        }) if !media_type.is_empty() => media_type,
        Ok(Probe {
            manifests: Some(_), ..
        }) => OCI_IMAGE_INDEX_MEDIA_TYPE.to_string(),
        _ => OCI_IMAGE_MANIFEST_MEDIA_TYPE.to_string(),
    }
}

/// OCI image configuration, the equivalent of `docker inspect` output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(default, rename = "os.version", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ContainerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs: Option<RootFs>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<History>,
}

/// Execution parameters for containers started from the image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposed_ports: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    #[serde(default)]
    pub diff_ids: Vec<String>,
}

/// One entry of the image's layer history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub empty_layer: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_docker_style_config() {
        let raw = r#"{
            "architecture": "amd64",
            "os": "linux",
            "created": "2024-01-02T03:04:05Z",
            "docker_version": "24.0.7",
            "config": {
                "User": "app",
                "Env": ["PATH=/usr/local/bin:/usr/bin", "APP_ENV=prod"],
                "Entrypoint": ["/app/server"],
                "Cmd": ["--port", "8080"],
                "ExposedPorts": {"8080/tcp": {}},
                "WorkingDir": "/app",
                "Labels": {"org.opencontainers.image.source": "https://example.com/app"}
            },
            "rootfs": {"type": "layers", "diff_ids": ["sha256:aaa", "sha256:bbb"]},
            "history": [
                {"created_by": "/bin/sh -c #(nop) ADD file:abc in /"},
                {"created_by": "/bin/sh -c #(nop) CMD [\"sh\"]", "empty_layer": true}
            ]
        }"#;

        let config: ConfigFile = serde_json::from_str(raw).unwrap();
        let container = config.config.as_ref().unwrap();

        assert_eq!(config.architecture, "amd64");
        assert_eq!(container.entrypoint.as_deref(), Some(&["/app/server".to_string()][..]));
        assert_eq!(container.working_dir.as_deref(), Some("/app"));
        assert_eq!(
            container.labels.as_ref().unwrap()["org.opencontainers.image.source"],
            "https://example.com/app"
        );
        assert_eq!(config.rootfs.as_ref().unwrap().diff_ids.len(), 2);
        assert!(config.history[1].empty_layer);
        assert!(!config.history[0].empty_layer);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config: ConfigFile = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_manifest_media_type() {
        assert_eq!(
            manifest_media_type(
                br#"{"schemaVersion":2,"mediaType":"application/vnd.docker.distribution.manifest.v2+json"}"#
            ),
            DOCKER_MANIFEST_MEDIA_TYPE
        );
        assert_eq!(
            manifest_media_type(br#"{"schemaVersion":2,"manifests":[]}"#),
            OCI_IMAGE_INDEX_MEDIA_TYPE
        );
        assert_eq!(
            manifest_media_type(br#"{"schemaVersion":2,"config":{}}"#),
            OCI_IMAGE_MANIFEST_MEDIA_TYPE
        );
        assert_eq!(manifest_media_type(b"not json"), OCI_IMAGE_MANIFEST_MEDIA_TYPE);
    }
}
