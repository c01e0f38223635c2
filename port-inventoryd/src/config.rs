use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Configuration written to disk on first start when no file exists.
const DEFAULT_CONFIG: &str = r#"[server]
# Address the HTTP API listens on.
listen = "0.0.0.0:10810"

[snapshot]
# Interface name prefixes hidden from the interface snapshot.
exclude_interfaces = ["lo", "br-", "veth", "docker0"]
# Plain-text public IP lookup endpoint. Leave empty to disable the lookup.
public_ip_url = "https://4.ipw.cn"
public_ip_timeout_secs = 10

[store]
# Where service annotations are persisted.
data_path = "/var/lib/port-inventory/annotations.json"
"#;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    /// Interface name prefixes to hide
    #[serde(default = "default_exclude_interfaces")]
    pub exclude_interfaces: Vec<String>,
    /// Endpoint returning the caller's public IP as plain text.
    /// An empty string disables the lookup.
    #[serde(default = "default_public_ip_url")]
    pub public_ip_url: String,
    #[serde(default = "default_public_ip_timeout")]
    pub public_ip_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
}

fn default_listen() -> String {
    "0.0.0.0:10810".to_string()
}

fn default_exclude_interfaces() -> Vec<String> {
    vec![
        "lo".to_string(),
        "br-".to_string(),
        "veth".to_string(),
        "docker0".to_string(),
    ]
}

fn default_public_ip_url() -> String {
    "https://4.ipw.cn".to_string()
}

fn default_public_ip_timeout() -> u64 {
    10
}

fn default_data_path() -> PathBuf {
    PathBuf::from("/var/lib/port-inventory/annotations.json")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            exclude_interfaces: default_exclude_interfaces(),
            public_ip_url: default_public_ip_url(),
            public_ip_timeout_secs: default_public_ip_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration, writing a commented default file first if none
    /// exists yet.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).with_context(|| {
                    format!("Failed to create config directory: {}", dir.display())
                })?;
            }
            std::fs::write(path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write default config: {}", path.display()))?;
            tracing::info!("Wrote default configuration to {}", path.display());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:10810");
        assert_eq!(
            config.snapshot.exclude_interfaces,
            vec!["lo", "br-", "veth", "docker0"]
        );
        assert_eq!(config.snapshot.public_ip_url, "https://4.ipw.cn");
        assert_eq!(config.snapshot.public_ip_timeout_secs, 10);
        assert_eq!(
            config.store.data_path,
            PathBuf::from("/var/lib/port-inventory/annotations.json")
        );
    }

    #[test]
    fn partial_toml_overrides_one_section() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:9000"
        "#,
        )
        .unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.snapshot.public_ip_timeout_secs, 10);
    }

    #[test]
    fn load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.listen, "0.0.0.0:10810");

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("[snapshot]"));
    }
}
