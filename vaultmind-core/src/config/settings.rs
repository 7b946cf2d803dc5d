//! Settings configuration loaded from TOML files.
//!
//! This module handles the on-disk configuration stored in the XDG config
//! directory (~/.config/vaultmind/config.toml).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_TOML: &str = r#"# vaultmind configuration file
# Located at: ~/.config/vaultmind/config.toml
#
# Every value below is optional; commented entries show the defaults.

[logging]
level = "info"

[vault]
# root = "/path/to/vault"
# ignore_dirs = [".obsidian", ".trash", ".git"]

[engine]
# embedding_url = "http://127.0.0.1:11434"
# embedding_model = "nomic-embed-text"
# embedding_batch = 32

[engine.search]
# rrf_k = 60
# max_results = 10
# bm25_limit = 50
# dense_limit = 50
# snippet_tokens = 12

[engine.graph]
# default_limit = 50
# max_depth = 6
# direct_link_weight = 3.0
# shared_tag_weight = 1.0
# shared_neighbor_weight = 1.5

[engine.schema]
# required_threshold = 0.9
# enum_max_distinct = 10
# example_paths = 3
"#;

/// Top-level settings file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Vault location
    #[serde(default)]
    pub vault: VaultFileSettings,

    /// Engine tuning
    #[serde(default)]
    pub engine: EngineToolsSettings,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Vault location settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VaultFileSettings {
    /// Vault root directory
    pub root: Option<String>,

    /// Directory names to skip while loading
    pub ignore_dirs: Option<Vec<String>>,
}

/// Engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineToolsSettings {
    /// Embedding provider base URL
    pub embedding_url: Option<String>,

    /// Embedding model name
    pub embedding_model: Option<String>,

    /// Embedding dimension (if known)
    pub embedding_dim: Option<usize>,

    /// Embedding batch size
    pub embedding_batch: Option<usize>,

    /// Search defaults
    #[serde(default)]
    pub search: EngineSearchSettings,

    /// Graph analytics defaults
    #[serde(default)]
    pub graph: EngineGraphSettings,

    /// Schema inference defaults
    #[serde(default)]
    pub schema: EngineSchemaSettings,
}

/// Search defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineSearchSettings {
    pub rrf_k: Option<usize>,
    pub max_results: Option<usize>,
    pub bm25_limit: Option<usize>,
    pub dense_limit: Option<usize>,
    pub snippet_tokens: Option<usize>,
}

/// Graph analytics defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineGraphSettings {
    pub default_limit: Option<usize>,
    pub max_depth: Option<usize>,
    pub direct_link_weight: Option<f64>,
    pub shared_tag_weight: Option<f64>,
    pub shared_neighbor_weight: Option<f64>,
}

/// Schema inference defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineSchemaSettings {
    pub required_threshold: Option<f64>,
    pub enum_max_distinct: Option<usize>,
    pub example_paths: Option<usize>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the default config file, creating it if missing.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load settings from a specific file, creating it with defaults if missing.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::info!("Creating default configuration at {:?}", path);
            Self::create_default_config(path)?;
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// Uses XDG config directory: `~/.config/vaultmind/config.toml`
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("VAULTMIND_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("vaultmind");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, DEFAULT_CONFIG_TOML)?;

        Ok(())
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }
}
