use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Prefix of environment variables read by [`Settings`], e.g.
/// `REGISTRY_JSON_KEY_PATH`.
pub const ENV_PREFIX: &str = "REGISTRY";

/// `REGISTRY_*` variables that belong to other tools, or select the config
/// directory, and are not settings fields.
const FOREIGN_ENV_VARS: &[&str] = &["REGISTRY_CONFIG_DIR", "REGISTRY_AUTH_FILE"];

/// Options that affect how a client resolves its credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientOptions {
    /// Path to a JSON key file. When set and non-empty, the file contents are
    /// used as the password for the `_json_key` user instead of the keychain.
    #[serde(default)]
    pub json_key_path: Option<PathBuf>,
}

impl ClientOptions {
    pub fn with_json_key(path: impl Into<PathBuf>) -> Self {
        Self {
            json_key_path: Some(path.into()),
        }
    }

    /// The configured key path, treating an empty value as unset.
    pub fn json_key_path(&self) -> Option<&Path> {
        self.json_key_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Options passed through to the registry transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransportOptions {
    /// Registries (host or host:port) spoken to over plain HTTP
    #[serde(default)]
    pub insecure_registries: Vec<String>,

    /// Upper bound for a single registry call, in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl TransportOptions {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Settings loaded from an optional config file and `REGISTRY_*` environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub client: ClientOptions,
    pub transport: TransportOptions,
}

/// Flat layout of the config file and environment
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    json_key_path: Option<PathBuf>,
    #[serde(default)]
    insecure_registries: Vec<String>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
}

impl From<SettingsFile> for Settings {
    fn from(file: SettingsFile) -> Self {
        Self {
            client: ClientOptions {
                json_key_path: file.json_key_path,
            },
            transport: TransportOptions {
                insecure_registries: file.insecure_registries,
                request_timeout_secs: file.request_timeout_secs,
            },
        }
    }
}

impl Settings {
    /// Load settings from `$REGISTRY_CONFIG_DIR/registry.{toml,yaml,yml}`
    /// (default directory `config`) and the process environment.
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = env::var("REGISTRY_CONFIG_DIR").unwrap_or_else(|_| "config".into());
        Self::load(Path::new(&config_dir), None)
    }

    /// Load settings from `config_dir`, reading environment variables from
    /// `env_vars` when given instead of the process environment.
    pub fn load(
        config_dir: &Path,
        env_vars: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let (settings, unused_fields) = Self::load_with_unused(config_dir, env_vars)?;

        for field in &unused_fields {
            tracing::warn!("Unknown registry configuration field: {}", field);
        }

        Ok(settings)
    }

    fn load_with_unused(
        config_dir: &Path,
        env_vars: Option<config::Map<String, String>>,
    ) -> Result<(Self, Vec<String>), ConfigError> {
        let env_vars: config::Map<String, String> = env_vars
            .unwrap_or_else(|| env::vars().collect())
            .into_iter()
            .filter(|(key, _)| !FOREIGN_ENV_VARS.contains(&key.as_str()))
            .collect();

        let mut builder = Config::builder();

        if let Some(path) = Self::find_config_file(config_dir, "registry") {
            tracing::info!("Loading config file: {}", path.display());
            builder = builder.add_source(config::File::from(path));
        } else {
            tracing::debug!(
                "Optional config file not found: {}/registry.{{toml,yaml,yml}}",
                config_dir.display()
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("insecure_registries")
                .source(Some(env_vars)),
        );

        let config = builder.build()?;
        let root_value = config
            .cache
            .into_table()
            .map_err(|e| ConfigError::Message(format!("Failed to get config table: {}", e)))?;

        let mut json_map = serde_json::Map::new();
        for (k, v) in root_value.iter() {
            json_map.insert(k.clone(), Self::config_value_to_json(v));
        }
        let json_value = serde_json::Value::Object(json_map);

        let mut unused_fields = Vec::new();
        let file: SettingsFile = serde_ignored::deserialize(json_value, |path| {
            unused_fields.push(path.to_string());
        })
        .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        Ok((file.into(), unused_fields))
    }

    /// Try extensions in order of preference.
    fn find_config_file(config_dir: &Path, name: &str) -> Option<PathBuf> {
        ["toml", "yaml", "yml"]
            .iter()
            .map(|ext| config_dir.join(format!("{}.{}", name, ext)))
            .find(|path| path.exists())
    }

    /// Convert a config::Value to a serde_json::Value. Empty strings become
    /// null so that `REGISTRY_JSON_KEY_PATH=` reads as unset.
    fn config_value_to_json(value: &config::Value) -> serde_json::Value {
        use config::ValueKind;

        match &value.kind {
            ValueKind::Nil => serde_json::Value::Null,
            ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
            ValueKind::I64(i) => serde_json::Value::Number((*i).into()),
            ValueKind::I128(i) => serde_json::Number::from_i128(*i)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(i.to_string())),
            ValueKind::U64(u) => serde_json::Value::Number((*u).into()),
            ValueKind::U128(u) => serde_json::Number::from_u128(*u)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(u.to_string())),
            ValueKind::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueKind::String(s) if s.is_empty() => serde_json::Value::Null,
            ValueKind::String(s) => serde_json::Value::String(s.clone()),
            ValueKind::Table(table) => {
                let mut map = serde_json::Map::new();
                for (k, v) in table.iter() {
                    map.insert(k.clone(), Self::config_value_to_json(v));
                }
                serde_json::Value::Object(map)
            }
            ValueKind::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(Self::config_value_to_json).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_map(vars: &[(&str, &str)]) -> config::Map<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_json_key_path_from_environment() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(
            temp_dir.path(),
            Some(env_map(&[("REGISTRY_JSON_KEY_PATH", "/secrets/key.json")])),
        )
        .unwrap();

        assert_eq!(
            settings.client.json_key_path(),
            Some(Path::new("/secrets/key.json"))
        );
    }

    #[test]
    fn test_empty_json_key_path_is_unset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(
            temp_dir.path(),
            Some(env_map(&[("REGISTRY_JSON_KEY_PATH", "")])),
        )
        .unwrap();

        assert_eq!(settings.client.json_key_path(), None);
        assert_eq!(ClientOptions::with_json_key("").json_key_path(), None);
    }

    #[test]
    fn test_defaults_without_sources() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(temp_dir.path(), Some(env_map(&[]))).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.transport.request_timeout(), None);
    }

    #[test]
    fn test_config_file_overridden_by_environment() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("registry.toml"),
            r#"
json_key_path = "/from/file.json"
insecure_registries = ["localhost:5000"]
request_timeout_secs = 30
"#,
        )
        .unwrap();

        let settings = Settings::load(
            temp_dir.path(),
            Some(env_map(&[("REGISTRY_JSON_KEY_PATH", "/from/env.json")])),
        )
        .unwrap();

        assert_eq!(
            settings.client.json_key_path(),
            Some(Path::new("/from/env.json"))
        );
        assert_eq!(settings.transport.insecure_registries, vec!["localhost:5000"]);
        assert_eq!(
            settings.transport.request_timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_insecure_registries_list_from_environment() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(
            temp_dir.path(),
            Some(env_map(&[
                ("REGISTRY_INSECURE_REGISTRIES", "localhost:5000,kind-registry:5001"),
                ("REGISTRY_REQUEST_TIMEOUT_SECS", "15"),
            ])),
        )
        .unwrap();

        assert_eq!(
            settings.transport.insecure_registries,
            vec!["localhost:5000", "kind-registry:5001"]
        );
        assert_eq!(settings.transport.request_timeout_secs, Some(15));
    }

    #[test]
    fn test_foreign_registry_variables_are_ignored() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (settings, unused) = Settings::load_with_unused(
            temp_dir.path(),
            Some(env_map(&[
                ("REGISTRY_AUTH_FILE", "/run/user/1000/containers/auth.json"),
                ("REGISTRY_CONFIG_DIR", "/etc/registry"),
                ("REGISTRY_REQUEST_TIMEOUT_SECS", "5"),
            ])),
        )
        .unwrap();

        assert!(unused.is_empty(), "unexpected unused fields: {:?}", unused);
        assert_eq!(settings.transport.request_timeout_secs, Some(5));
    }

    #[test]
    fn test_wide_integers_are_not_truncated() {
        use config::{Value, ValueKind};

        assert_eq!(
            Settings::config_value_to_json(&Value::new(None, ValueKind::I128(-7))),
            serde_json::json!(-7)
        );
        assert_eq!(
            Settings::config_value_to_json(&Value::new(None, ValueKind::U128(u128::MAX))),
            serde_json::Value::String(u128::MAX.to_string())
        );
    }

    #[test]
    fn test_unknown_fields_do_not_fail() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("registry.yaml"),
            "json_key_path: /key.json\nunknown_field: true\n",
        )
        .unwrap();

        let (settings, unused) =
            Settings::load_with_unused(temp_dir.path(), Some(env_map(&[]))).unwrap();
        assert_eq!(settings.client.json_key_path(), Some(Path::new("/key.json")));
        assert_eq!(unused, vec!["unknown_field".to_string()]);
    }
}
