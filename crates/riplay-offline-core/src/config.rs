//! Offline cache configuration.
//!
//! This module handles loading and saving the configuration: the page
//! origin, the current cache generation name, the install manifest and
//! where cache stores live on disk.
//!
//! Configuration is stored at `~/.config/riplay-offline/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::worker::{Manifest, DEFAULT_CACHE_NAME};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "riplay-offline";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Origin the site is served from during local development
const DEFAULT_ORIGIN: &str = "http://localhost:8000/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL of the hosting page; its origin decides same-origin requests
    pub origin: Url,
    /// Version string of the current cache generation
    pub cache_name: String,
    pub manifest: Manifest,
    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,
    /// Unset leaves timeouts to the network stack
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            manifest: Manifest::default(),
            cache_dir: None,
            request_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
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

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
