//! Toolkit configuration file.
//!
//! The file is a JSON document. [`ConfigDocument`] edits it by dotted path
//! (`admin.server_url`) so unknown keys survive a round trip, and
//! [`ToolkitConfig`] is the typed view the commands work with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use bwkit_session::{SidecarConfig, DEFAULT_STARTUP_TIMEOUT};
use bwkit_transport::cli::DEFAULT_EXECUTABLE;
use bwkit_transport::{DEFAULT_HOST, DEFAULT_PORT};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "bwkit.json";

/// Default vault server.
pub const DEFAULT_SERVER_URL: &str = "https://vault.bitwarden.com";

/// Configuration format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfVersion {
    pub major: u32,
    pub minor: u32,
}

impl ConfVersion {
    /// Current configuration format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if a file of this version can be read.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for ConfVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Connection to the vault service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Vault server URL.
    pub server_url: String,
    /// Account used for password logins.
    pub username: Option<String>,
    /// Client id used for API key logins.
    pub client_id: Option<String>,
    /// Vault executable, a bare name or a path.
    pub bw_executable: String,
    /// Talk to a `bw serve` sidecar instead of spawning one process per call.
    pub use_rest: bool,
    /// Bound on every vault call, in seconds.
    pub command_timeout_secs: Option<u64>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            username: None,
            client_id: None,
            bw_executable: DEFAULT_EXECUTABLE.to_string(),
            use_rest: true,
            command_timeout_secs: None,
        }
    }
}

/// Sidecar address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// Time allowed for the sidecar to come up, in seconds.
    pub startup_timeout_secs: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT.as_secs(),
        }
    }
}

/// Typed view of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    pub conf_version: ConfVersion,
    pub admin: AdminConfig,
    pub serve: ServeConfig,
}

impl ToolkitConfig {
    /// Per-call timeout, if configured.
    pub fn command_timeout(&self) -> Option<Duration> {
        self.admin.command_timeout_secs.map(Duration::from_secs)
    }

    /// Sidecar settings, present only in REST mode.
    pub fn sidecar(&self) -> Option<SidecarConfig> {
        self.admin.use_rest.then(|| {
            SidecarConfig::new(self.serve.host.clone(), self.serve.port)
                .with_startup_timeout(Some(Duration::from_secs(self.serve.startup_timeout_secs)))
        })
    }
}

/// The configuration file as a JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    root: Value,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self::from_config(&ToolkitConfig::default())
    }
}

impl ConfigDocument {
    /// Document holding `config`.
    pub fn from_config(config: &ToolkitConfig) -> Self {
        let root = serde_json::to_value(config).unwrap_or_else(|_| Value::Object(Map::new()));
        Self { root }
    }

    /// Parse a document.
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text).context("Configuration is not valid JSON")?;
        if !root.is_object() {
            bail!("Configuration must be a JSON object");
        }
        Ok(Self { root })
    }

    /// Load `path`, or the defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Write the document to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.root)?;
        std::fs::write(path, text + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.root, |node, key| node.as_object()?.get(key))
    }

    /// Set the value at a dotted path, creating missing parents.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        let keys: Vec<&str> = path.split('.').collect();
        if keys.iter().any(|key| key.is_empty()) {
            bail!("Invalid configuration path '{}'", path);
        }
        let (last, parents) = keys.split_last().context("Empty configuration path")?;

        let mut node = &mut self.root;
        for key in parents {
            let Some(object) = node.as_object_mut() else {
                bail!("'{}' does not lead to an object", path);
            };
            node = object
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let Some(object) = node.as_object_mut() else {
            bail!("'{}' does not lead to an object", path);
        };
        object.insert(last.to_string(), value);
        Ok(())
    }

    /// Typed view, checking the format version.
    pub fn to_config(&self) -> Result<ToolkitConfig> {
        let config: ToolkitConfig =
            serde_json::from_value(self.root.clone()).context("Configuration has invalid values")?;
        if !config.conf_version.is_compatible() {
            bail!(
                "Incompatible configuration version {}.{}, expected {}.x",
                config.conf_version.major,
                config.conf_version.minor,
                ConfVersion::CURRENT.major
            );
        }
        Ok(config)
    }
}

/// Value given on the command line: JSON if it parses, a string otherwise.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Config file path: the flag, or the default name in the working directory.
pub fn config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ToolkitConfig::default();
        assert_eq!(config.admin.server_url, "https://vault.bitwarden.com");
        assert!(config.admin.use_rest);
        assert_eq!(config.serve.host, "localhost");
        assert_eq!(config.serve.port, 8087);
        assert!(config.command_timeout().is_none());

        let sidecar = config.sidecar().unwrap();
        assert_eq!(sidecar.startup_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_dotted_get_and_set() {
        let mut doc = ConfigDocument::default();
        assert_eq!(doc.get("admin.use_rest"), Some(&json!(true)));
        assert!(doc.get("admin.nope").is_none());

        doc.set("admin.server_url", json!("https://vault.example.com")).unwrap();
        doc.set("admin.use_rest", parse_value("false")).unwrap();
        doc.set("extra.note", parse_value("kept as text")).unwrap();

        let config = doc.to_config().unwrap();
        assert_eq!(config.admin.server_url, "https://vault.example.com");
        assert!(config.sidecar().is_none());
        assert_eq!(doc.get("extra.note"), Some(&json!("kept as text")));
    }

    #[test]
    fn test_set_rejects_bad_paths() {
        let mut doc = ConfigDocument::default();
        assert!(doc.set("admin.server_url.inner", json!(1)).is_err());
        assert!(doc.set("admin..port", json!(1)).is_err());
    }

    #[test]
    fn test_invalid_values_and_versions() {
        let mut doc = ConfigDocument::default();
        doc.set("serve.port", json!("eighty")).unwrap();
        assert!(doc.to_config().is_err());

        let doc = ConfigDocument::parse(r#"{"conf_version": {"major": 2, "minor": 0}}"#).unwrap();
        assert!(doc.to_config().is_err());

        assert!(ConfigDocument::parse("[1]").is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let doc = ConfigDocument::parse(r#"{"admin": {"username": "alice@example.com"}}"#).unwrap();
        let config = doc.to_config().unwrap();
        assert_eq!(config.admin.username.as_deref(), Some("alice@example.com"));
        assert_eq!(config.admin.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.serve.port, DEFAULT_PORT);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);

        let missing = ConfigDocument::load(&path).unwrap();
        assert_eq!(missing, ConfigDocument::default());

        let mut doc = ConfigDocument::default();
        doc.set("admin.username", json!("bob@example.com")).unwrap();
        doc.save(&path).unwrap();

        let loaded = ConfigDocument::load(&path).unwrap();
        assert_eq!(loaded.get("admin.username"), Some(&json!("bob@example.com")));
    }
}
