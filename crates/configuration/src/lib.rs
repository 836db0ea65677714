use crate::error::ConfigError;
use std::path::Path;
use tracing_subscriber::EnvFilter;

pub mod error;
pub mod settings;

pub use settings::{
    BotConfig, Config, DcaParams, ExchangeConfig, GridParams, LoggingConfig, RiskManagement,
    SmcParams, TrendParams,
};

/// Loads and validates the application configuration from a TOML file.
///
/// This is the primary entry point for this crate: it reads the file,
/// deserializes it into the strongly-typed `Config` tree, and runs every
/// section's `validate()` before returning it — an invalid `bots.toml`
/// never reaches the engine.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }
    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("AEGIS").separator("__"))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

/// Initializes the global `tracing` subscriber from a `LoggingConfig` block.
///
/// Mirrors the teacher's config-driven tracing setup: an `EnvFilter` built
/// from `logging.level`, with an optional non-blocking file appender layered
/// in when `file_logging` is set. Returns the appender's guard, which the
/// caller must hold for the lifetime of the process — dropping it stops
/// flushing buffered log lines to disk.
pub fn init_tracing(
    logging: &LoggingConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.file_logging {
        std::fs::create_dir_all(&logging.log_directory)?;
        let file_appender =
            tracing_appender::rolling::daily(&logging.log_directory, &logging.log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_ansi(false)
            .try_init()
            .map_err(|e| ConfigError::LoggingInit(e.to_string()))?;

        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| ConfigError::LoggingInit(e.to_string()))?;

        Ok(None)
    }
}
