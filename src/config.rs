//! Configuration management for Setlist Sync
//!
//! Handles loading, parsing, and validation of the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::catalog::DEFAULT_CATALOG_KEY;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// MIDI device configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Client name announced to the host MIDI stack
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Case-insensitive substring of the output to bind at startup
    ///
    /// When absent the first listed output is bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            output_port: None,
            init_timeout_ms: default_init_timeout_ms(),
        }
    }
}

impl MidiConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

/// Where the song catalog lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogBackend {
    /// Embedded sled database in the state directory
    #[default]
    Sled,
    /// One JSON file per key in the state directory
    File,
    /// Nothing survives a restart
    Memory,
}

/// Catalog storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub backend: CatalogBackend,
    /// Storage key the song list is kept under
    #[serde(default = "default_catalog_key")]
    pub key: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            backend: CatalogBackend::default(),
            key: default_catalog_key(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))
    }

    /// Load the file if it exists, defaults otherwise
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await.unwrap_or(false) {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path).await
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty file is a valid, all-defaults config
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: AppConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness
    pub fn validate(&self) -> Result<()> {
        if self.midi.client_name.trim().is_empty() {
            anyhow::bail!("MIDI client_name cannot be empty");
        }
        if self.midi.init_timeout_ms == 0 {
            anyhow::bail!("MIDI init_timeout_ms must be greater than 0");
        }
        if let Some(port) = &self.midi.output_port {
            if port.trim().is_empty() {
                anyhow::bail!("MIDI output_port cannot be blank (omit it instead)");
            }
        }
        if self.catalog.key.trim().is_empty() {
            anyhow::bail!("Catalog key cannot be empty");
        }
        Ok(())
    }
}

// Default value functions
fn default_client_name() -> String { "Setlist Sync".to_string() }
fn default_init_timeout_ms() -> u64 { 5000 }
fn default_catalog_key() -> String { DEFAULT_CATALOG_KEY.to_string() }
