//! Application path management for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds): `config.yaml` in the working directory
//!   keeps everything next to it.
//! - **Portable mode**: a `.portable` marker next to the executable stores
//!   all data in the executable's directory.
//! - **Installed mode** (default): data lives in the platform data dir,
//!   e.g. `~/.local/share/Setlist Sync` or `%APPDATA%\Setlist Sync`.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::AppConfig;

/// Application name used for directories in installed mode
const APP_NAME: &str = "Setlist Sync";

/// Application paths for config, state, and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Catalog storage (sled database or JSON files)
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!("[paths] Running in DEV mode (config.yaml found in {})", cwd.display());
                return Self::rooted_at(&cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::rooted_at(&exe_dir, true);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no platform data dir, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] Running in INSTALLED mode (data dir: {})", app_data.display());

        Self {
            config: app_data.join("config.yaml"),
            state_dir: app_data.join("state"),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Layout with everything under `base` (dev and portable modes)
    pub fn rooted_at(base: &Path, is_portable: bool) -> Self {
        Self {
            config: base.join("config.yaml"),
            state_dir: base.join(".state"),
            logs_dir: base.join("logs"),
            is_portable,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure all required directories exist.
    ///
    /// In installed mode a default `config.yaml` is written when none exists
    /// so there is something to edit.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [&self.state_dir, &self.logs_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }

        if !self.is_portable && !self.config.exists() {
            if let Some(parent) = self.config.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let yaml = serde_yaml::to_string(&AppConfig::default())
                .context("Failed to serialize default config")?;
            std::fs::write(&self.config, yaml).with_context(|| {
                format!("Failed to write default config to {}", self.config.display())
            })?;
            info!("Wrote default config to {}", self.config.display());
        }

        Ok(())
    }

    /// Get the sled database path (within state_dir)
    pub fn sled_db_path(&self) -> PathBuf {
        self.state_dir.join("sled")
    }

    /// Directory for the JSON file catalog backend
    pub fn catalog_dir(&self) -> PathBuf {
        self.state_dir.join("catalog")
    }
}
