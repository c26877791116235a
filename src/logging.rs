//! Log sink setup for the binaries.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to whoever owns the process.

use crate::config::LoggingConfig;
use crate::error::ConfigError;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Accepts `debug|info|warn|error` in any case, plus the older
/// `Warning`/`Fatal` spellings.
pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "fatal" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        other => Err(ConfigError::Invalid {
            field: "logging.level",
            reason: format!("unknown level {other:?}"),
        }),
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// primary sink's level; extra destinations always use their own level.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    tracing_subscriber::registry()
        .with(layers(config)?)
        .try_init()
        .map_err(|e| ConfigError::Invalid { field: "logging", reason: e.to_string() })
}

/// One fmt layer for the primary sink plus one per destination file.
fn layers(config: &LoggingConfig) -> Result<Vec<BoxedLayer>, ConfigError> {
    let level = parse_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let primary: BoxedLayer = match &config.file {
        Some(path) => fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(open_append(path)?))
            .with_filter(filter)
            .boxed(),
        None => fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    };

    let mut layers = vec![primary];
    for destination in &config.destinations {
        let level = parse_level(&destination.level)?;
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(open_append(&destination.path)?))
                .with_filter(level)
                .boxed(),
        );
    }
    Ok(layers)
}

fn open_append(path: &Path) -> Result<File, ConfigError> {
    let io_err = |source| ConfigError::Io { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    OpenOptions::new().create(true).append(true).open(path).map_err(io_err)
}
