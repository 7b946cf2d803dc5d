pub mod config;
pub mod logging;

// Config re-exports
pub use config::{
    EngineSettings,
    GraphDefaults,
    SchemaDefaults,
    SearchDefaults,
    Settings,
    SettingsError,
    load_dotenv,
};
pub use logging::init_tracing;
