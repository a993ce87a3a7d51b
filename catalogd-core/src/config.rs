use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "catalogd.toml";

/// Process configuration: where to listen and which database files to serve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub server: ServerSettings,
    pub databases: DatabasesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Allow any origin instead of localhost only
    pub cors_permissive: bool,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3030)),
            cors_permissive: false,
            timeout_secs: 30,
        }
    }
}

/// An application whose path is `None` is not mounted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabasesConfig {
    pub sakila: Option<PathBuf>,
    pub chinook: Option<PathBuf>,
}

impl Default for DatabasesConfig {
    fn default() -> Self {
        Self {
            sakila: Some(PathBuf::from("sakila_master.db")),
            chinook: Some(PathBuf::from("Chinook.db")),
        }
    }
}

impl CatalogConfig {
    /// Load config, then apply environment overrides.
    ///
    /// An explicit path must exist. Without one, `./catalogd.toml` is used
    /// when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CoreError::ConfigNotFound {
                        path: path.to_path_buf(),
                    }
                    .into());
                }
                Self::from_file(path)?
            }
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    tracing::debug!(path = ?fallback, "loading config from working directory");
                    Self::from_file(fallback)?
                } else {
                    tracing::debug!("no config file, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file (invalid TOML): {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `CATALOGD_BIND`, `SAKILA_DB`, `CHINOOK_DB`. An empty database
    /// variable disables that application.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(bind) = env::var("CATALOGD_BIND") {
            self.server.bind = bind
                .parse()
                .map_err(|e| CoreError::config(format!("CATALOGD_BIND={bind}: {e}")))?;
        }
        if let Ok(path) = env::var("SAKILA_DB") {
            self.databases.sakila = non_empty_path(&path);
        }
        if let Ok(path) = env::var("CHINOOK_DB") {
            self.databases.chinook = non_empty_path(&path);
        }
        Ok(())
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_serve_both_databases() {
        let config = CatalogConfig::default();
        assert_eq!(config.server.bind.port(), 3030);
        assert_eq!(config.databases.sakila, Some(PathBuf::from("sakila_master.db")));
        assert_eq!(config.databases.chinook, Some(PathBuf::from("Chinook.db")));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CatalogConfig::from_toml(
            r#"
            [server]
            bind = "0.0.0.0:8080"

            [databases]
            chinook = "/data/chinook.sqlite"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind.to_string(), "0.0.0.0:8080");
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(
            config.databases.chinook,
            Some(PathBuf::from("/data/chinook.sqlite"))
        );
        assert_eq!(config.databases.sakila, Some(PathBuf::from("sakila_master.db")));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CatalogConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config not found"));
    }

    #[test]
    fn reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\ncors_permissive = true\ntimeout_secs = 5").unwrap();

        let config = CatalogConfig::from_file(file.path()).unwrap();
        assert!(config.server.cors_permissive);
        assert_eq!(config.server.timeout_secs, 5);
    }

    #[test]
    fn invalid_toml_has_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nbind = ").unwrap();

        let err = CatalogConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }

    #[test]
    fn blank_env_path_disables() {
        assert_eq!(non_empty_path("  "), None);
        assert_eq!(non_empty_path("a.db"), Some(PathBuf::from("a.db")));
    }
}
