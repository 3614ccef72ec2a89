//! Application configuration management.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config`, or `config.toml` in the platform config dir)
//! 3. Environment variables prefixed `DIRMATCH_` (`__` separates nesting)
//! 4. Command-line flags, applied by the command handlers
//!
//! ```toml
//! io_threads = 8
//! skip_hidden = true
//! ignore_patterns = ["*.tmp", ".cache/"]
//! plugins = ["blake3"]
//! use_trash = true
//! ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::scanner::WalkerConfig;

/// Environment variable prefix for configuration keys.
pub const ENV_PREFIX: &str = "DIRMATCH_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Threads used for fingerprinting
    pub io_threads: usize,
    /// Skip hidden files and directories
    pub skip_hidden: bool,
    /// Follow symbolic links
    pub follow_symlinks: bool,
    /// Gitignore-style patterns excluded from walks
    pub ignore_patterns: Vec<String>,
    /// Plugins used when none are given on the command line
    pub plugins: Vec<String>,
    /// Move deleted files to the trash instead of removing them
    pub use_trash: bool,
    /// ffmpeg executable for the media plugin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_threads: 4,
            skip_hidden: false,
            follow_symlinks: false,
            ignore_patterns: Vec::new(),
            plugins: Vec::new(),
            use_trash: false,
            ffmpeg_path: None,
        }
    }
}

impl Config {
    /// The provider stack for a config file, without reading anything yet.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the layered configuration.
    ///
    /// An explicit file must exist; the default file is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing or any layer fails
    /// to parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = match explicit {
            Some(path) => {
                if !path.is_file() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => match Self::config_path() {
                Ok(path) => Some(path),
                Err(e) => {
                    log::debug!("No default config location: {}", e);
                    None
                }
            },
        };

        if let Some(path) = &file {
            log::debug!("Loading configuration from {}", path.display());
        }
        let config: Self = Self::figment(file.as_deref())
            .extract()
            .context("Failed to load configuration")?;
        Ok(config)
    }

    /// Write the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Get the default platform-specific configuration path.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "dirmatch", "dirmatch")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Traversal settings derived from this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig::new(
            self.follow_symlinks,
            self.skip_hidden,
            self.ignore_patterns.clone(),
        )
    }
}
