//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, the build mode (which decides whether developer feature-flag
//! overrides are honoured), the request timeout, and the last email used to
//! sign in.
//!
//! Configuration is stored at `~/.config/hirewave/config.json`. The
//! `HIREWAVE_API_URL`, `HIREWAVE_MODE` and `HIREWAVE_DATA_DIR` environment
//! variables take precedence over the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "hirewave";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when nothing else is configured
const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    #[default]
    Production,
}

impl Mode {
    pub fn is_production(&self) -> bool {
        *self == Mode::Production
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(anyhow::anyhow!("Unknown mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub mode: Mode,
    pub request_timeout_secs: u64,
    pub last_email: Option<String>,
    /// Overrides the platform data directory (token file, cookie jar, logs)
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            mode: Mode::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            last_email: None,
            data_dir: None,
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(
            std::env::var("HIREWAVE_API_URL").ok(),
            std::env::var("HIREWAVE_MODE").ok(),
            std::env::var("HIREWAVE_DATA_DIR").ok(),
        );
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides; invalid values are ignored.
    pub fn apply_overrides(
        &mut self,
        api_url: Option<String>,
        mode: Option<String>,
        data_dir: Option<String>,
    ) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(mode) = mode.and_then(|m| m.parse().ok()) {
            self.mode = mode;
        }
        if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert!(config.mode.is_production());
        assert_eq!(config.request_timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            mode: Mode::Development,
            last_email: Some("jane@example.com".to_string()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.mode, Mode::Development);
        assert_eq!(loaded.last_email.as_deref(), Some("jane@example.com"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"mode": "development"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(
            Some("https://api.hirewave.online/api".to_string()),
            Some("dev".to_string()),
            Some("/tmp/hirewave".to_string()),
        );
        assert_eq!(config.api_base_url, "https://api.hirewave.online/api");
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/hirewave"));

        config.apply_overrides(None, Some("staging".to_string()), Some(String::new()));
        assert_eq!(config.mode, Mode::Development);
    }
}
