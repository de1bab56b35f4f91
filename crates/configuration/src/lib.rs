use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_logging;
pub use settings::{
    CacheConfig, Config, CurriculumConfig, LoggingConfig, ProgressStoreConfig, ServerConfig, SyncConfig,
};

/// Environment variables with this prefix override file values, e.g.
/// `ACADEMY__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "ACADEMY";

/// Loads the application configuration from `config.toml` and the environment.
///
/// This function is the primary entry point for this crate. A missing file is not
/// an error; every setting has a default.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

/// Same as [`load_config`] with an explicit file path.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
