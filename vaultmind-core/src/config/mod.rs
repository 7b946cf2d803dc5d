//! Configuration management for vaultmind.
//!
//! Settings live in a single TOML file. Every knob is optional in the file;
//! the engine works with the resolved [`EngineSettings`] where each value has
//! been filled with its default.
//!
//! # Configuration Sources
//!
//! ## Settings (TOML File)
//! Located at `~/.config/vaultmind/config.toml` (or
//! `$VAULTMIND_CONFIG_DIR/config.toml`):
//! ```toml
//! [logging]
//! level = "info"
//!
//! [vault]
//! root = "/home/me/notes"
//!
//! [engine.search]
//! rrf_k = 60
//!
//! [engine.graph]
//! default_limit = 50
//! ```
//!
//! ## Environment
//! - `VAULTMIND_CONFIG_DIR` - override the config directory
//! - `RUST_LOG` - override the configured log level

pub mod engine;
mod settings;

pub use engine::{EngineSettings, GraphDefaults, SchemaDefaults, SearchDefaults};
pub use settings::{
    EngineGraphSettings, EngineSchemaSettings, EngineSearchSettings, EngineToolsSettings,
    LoggingSettings, Settings, SettingsError, VaultFileSettings,
};

/// Load a `.env` file from the working directory if one exists.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

impl Settings {
    /// Resolve the engine settings, folding the `[vault]` section in.
    pub fn engine_settings(&self) -> EngineSettings {
        let mut engine = EngineSettings::from(&self.engine);
        if let Some(root) = &self.vault.root {
            engine.vault_root = Some(root.into());
        }
        if let Some(dirs) = &self.vault.ignore_dirs {
            engine.ignore_dirs = dirs.clone();
        }
        engine
    }
}
