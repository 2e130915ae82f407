use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::{debug, trace};

use super::credentials::{AuthTarget, Credential, CredentialResolver};
use crate::error::KeychainError;

const DOCKER_HUB_INDEX: &str = "index.docker.io";

/// Server URL docker logs in to, and stores credentials under, for docker hub.
const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";

/// Username docker uses when an auth entry carries an identity token.
const IDENTITY_TOKEN_USERNAME: &str = "<token>";

/// Default host keychain backed by docker and podman auth files
///
/// Looks up the registry host in each auth file in order, consulting
/// credential helpers (`docker-credential-*`) where configured. A host with no
/// entry anywhere resolves to [`Credential::Anonymous`].
#[derive(Debug, Clone)]
pub struct DockerKeychain {
    paths: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default, rename = "credHelpers")]
    cred_helpers: HashMap<String, String>,
    #[serde(default, rename = "credsStore")]
    creds_store: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, rename = "identitytoken")]
    identity_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelperResponse {
    #[serde(rename = "Username")]
    username: String,
    #[serde(rename = "Secret")]
    secret: String,
}

impl DockerKeychain {
    /// Auth files at their conventional locations, honouring `DOCKER_CONFIG`,
    /// `REGISTRY_AUTH_FILE` and `XDG_RUNTIME_DIR`.
    pub fn from_env() -> Self {
        let mut paths = Vec::new();

        match std::env::var_os("DOCKER_CONFIG").filter(|v| !v.is_empty()) {
            Some(dir) => paths.push(PathBuf::from(dir).join("config.json")),
            None => {
                if let Some(home) = dirs::home_dir() {
                    paths.push(home.join(".docker").join("config.json"));
                }
            }
        }

        match std::env::var_os("REGISTRY_AUTH_FILE").filter(|v| !v.is_empty()) {
            Some(file) => paths.push(PathBuf::from(file)),
            None => {
                if let Some(runtime_dir) = dirs::runtime_dir() {
                    paths.push(runtime_dir.join("containers").join("auth.json"));
                }
            }
        }

        Self { paths }
    }

    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn load(path: &Path) -> Result<Option<DockerConfigFile>, KeychainError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(KeychainError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| KeychainError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    fn lookup(
        config: &DockerConfigFile,
        host: &str,
    ) -> Result<Option<Credential>, KeychainError> {
        let host = normalize_host(host);

        if let Some((_, helper)) = config
            .cred_helpers
            .iter()
            .find(|(key, _)| normalize_host(key) == host)
        {
            return run_helper(helper, helper_server_url(&host));
        }

        if let Some(helper) = config.creds_store.as_deref().filter(|h| !h.is_empty()) {
            if let Some(credential) = run_helper(helper, helper_server_url(&host))? {
                return Ok(Some(credential));
            }
        }

        match config
            .auths
            .iter()
            .find(|(key, _)| normalize_host(key) == host)
        {
            Some((_, entry)) => decode_entry(entry, &host).map(Some),
            None => Ok(None),
        }
    }
}

impl CredentialResolver for DockerKeychain {
    fn resolve(&self, target: &AuthTarget) -> Result<Credential, KeychainError> {
        for path in &self.paths {
            let Some(config) = Self::load(path)? else {
                trace!("Auth file {} not present", path.display());
                continue;
            };

            if let Some(credential) = Self::lookup(&config, &target.host_key)? {
                debug!(
                    "Found credentials for {} in {}",
                    target.host_key,
                    path.display()
                );
                return Ok(credential);
            }
        }

        debug!(
            "No credentials found for {}, using anonymous access",
            target.host_key
        );
        Ok(Credential::Anonymous)
    }
}

/// Reduce an auth file key (`https://index.docker.io/v1/`, `gcr.io`, ...) to a
/// bare host, folding the docker hub aliases together.
fn normalize_host(key: &str) -> String {
    let host = key
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or(key);

    match host {
        "docker.io" | "registry-1.docker.io" | DOCKER_HUB_INDEX => DOCKER_HUB_INDEX.to_string(),
        other => other.to_string(),
    }
}

/// Key a credential helper knows the host by.
fn helper_server_url(host: &str) -> &str {
    if host == DOCKER_HUB_INDEX {
        DOCKER_HUB_SERVER
    } else {
        host
    }
}

fn decode_entry(entry: &AuthEntry, host: &str) -> Result<Credential, KeychainError> {
    if let Some(token) = entry.identity_token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(Credential::basic(IDENTITY_TOKEN_USERNAME, token));
    }

    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        if !username.is_empty() || !password.is_empty() {
            return Ok(Credential::basic(username.as_str(), password.as_str()));
        }
    }

    let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) else {
        return Ok(Credential::Anonymous);
    };

    let invalid = |reason: String| KeychainError::InvalidAuth {
        host: host.to_string(),
        reason,
    };

    let decoded = STANDARD
        .decode(auth.trim())
        .map_err(|e| invalid(format!("auth is not valid base64: {}", e)))?;
    let decoded =
        String::from_utf8(decoded).map_err(|e| invalid(format!("auth is not utf-8: {}", e)))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| invalid("auth must have the form user:password".to_string()))?;

    Ok(Credential::basic(username, password))
}

/// Ask `docker-credential-<helper>` for the credentials stored under `server`.
///
/// Returns `Ok(None)` when the helper has no entry for it.
fn run_helper(helper: &str, server: &str) -> Result<Option<Credential>, KeychainError> {
    let program = format!("docker-credential-{}", helper);
    debug!("Invoking credential helper {} for {}", program, server);

    let helper_err = |reason: String| KeychainError::Helper {
        helper: helper.to_string(),
        reason,
    };

    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| helper_err(format!("failed to start {}: {}", program, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(server.as_bytes())
            .map_err(|e| helper_err(format!("failed to write to {}: {}", program, e)))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| helper_err(format!("failed to wait for {}: {}", program, e)))?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains("credentials not found") {
            return Ok(None);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(helper_err(format!(
            "{}: {}",
            output.status,
            if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            }
        )));
    }

    let response: HelperResponse = serde_json::from_slice(&output.stdout)
        .map_err(|e| helper_err(format!("invalid response: {}", e)))?;

    Ok(Some(Credential::basic(response.username, response.secret)))
}
