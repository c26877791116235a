//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for the service configuration file.
//!     loads it from TOML (`.toml`) or JSON (any other extension) and
//!     rejects unusable values before anything touches the serial port.
//!
//! structure:
//!     - SerialConfig: device path, baud rate, backend selection.
//!     - StorageConfig: where the raw/hourly/daily tier files live.
//!     - LoggingConfig: level, optional log file, per-reading verbosity.
//!     - SimulatorConfig: waveform parameters for the simulated backend and tool.
//!
//! ==============================================================================

use crate::error::ConfigError;
use crate::transport::BaudRate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub serial: SerialConfig,
    /// measurement tick period in milliseconds
    #[serde(alias = "mesure_delay")]
    pub measure_interval_ms: u64,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub backend: BackendKind,
    /// unset = block until at least one byte arrives
    pub read_timeout_ms: Option<u64>,
}

/// which serial backend drives the line transport
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Uart,
    Simulated,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub file_system: FileStorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FileStorageConfig {
    pub temperature: PathBuf,
    pub hourly: PathBuf,
    pub daily: PathBuf,
}

/// `[logging]` accepts either a table or, as older configs wrote it, a bare
/// list of `{ path, level }` file destinations.
#[derive(Debug, Deserialize, Clone)]
#[serde(from = "LoggingSection")]
pub struct LoggingConfig {
    /// level of the primary sink (stderr, or `file` when set)
    pub level: String,
    pub file: Option<PathBuf>,
    pub show_readings: bool,
    /// extra log files, each filtered at its own level
    pub destinations: Vec<LogDestination>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogDestination {
    pub path: PathBuf,
    #[serde(default = "default_destination_level")]
    pub level: String,
}

fn default_destination_level() -> String {
    "info".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoggingSection {
    Table(LoggingTable),
    Destinations(Vec<LogDestination>),
}

#[derive(Deserialize)]
#[serde(default)]
struct LoggingTable {
    level: String,
    file: Option<PathBuf>,
    show_readings: bool,
    destinations: Vec<LogDestination>,
}

impl Default for LoggingTable {
    fn default() -> Self {
        let LoggingConfig { level, file, show_readings, destinations } = LoggingConfig::default();
        Self { level, file, show_readings, destinations }
    }
}

impl From<LoggingSection> for LoggingConfig {
    fn from(section: LoggingSection) -> Self {
        match section {
            LoggingSection::Table(t) => Self {
                level: t.level,
                file: t.file,
                show_readings: t.show_readings,
                destinations: t.destinations,
            },
            LoggingSection::Destinations(destinations) => {
                Self { destinations, ..Self::default() }
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorConfig {
    pub time_multiplier: f64,
    pub base_temperature: f64,
    pub amplitude: f64,
}

/// file format of a configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.toml` files are TOML, everything else is treated as JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

impl ServiceConfig {
    /// Load and validate configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content, ConfigFormat::from_path(path)).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate an in-memory document
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let parse_err = |message: String| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message,
        };

        let config: ServiceConfig = match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string()))?,
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        BaudRate::try_from(self.serial.baud_rate)?;

        if self.measure_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "measure_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "serial.port",
                reason: "must not be empty".to_string(),
            });
        }
        let multiplier = self.simulator.time_multiplier;
        if !(multiplier.is_finite() && multiplier >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "simulator.time_multiplier",
                reason: format!("{multiplier} is not a finite value >= 0"),
            });
        }
        crate::logging::parse_level(&self.logging.level)?;
        for destination in &self.logging.destinations {
            crate::logging::parse_level(&destination.level)?;
        }
        Ok(())
    }

    pub fn measure_interval(&self) -> Duration {
        Duration::from_millis(self.measure_interval_ms)
    }

    /// Log a one-shot configuration summary
    pub fn summary(&self) {
        tracing::info!(
            port = %self.serial.port,
            baud_rate = self.serial.baud_rate,
            backend = ?self.serial.backend,
            "serial configuration"
        );
        tracing::info!(
            interval_ms = self.measure_interval_ms,
            raw = %self.storage.file_system.temperature.display(),
            hourly = %self.storage.file_system.hourly.display(),
            daily = %self.storage.file_system.daily.display(),
            "storage configuration"
        );
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            measure_interval_ms: 100,
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            backend: BackendKind::Uart,
            read_timeout_ms: None,
        }
    }
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        Self {
            temperature: PathBuf::from("/var/log/temperature/current.log"),
            hourly: PathBuf::from("/var/log/temperature/hourly.log"),
            daily: PathBuf::from("/var/log/temperature/daily.log"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None, show_readings: true, destinations: Vec::new() }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { time_multiplier: 1.0, base_temperature: 20.0, amplitude: 15.0 }
    }
}
