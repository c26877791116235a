//! Error types for the temperature logger.
//!
//! Four categories, each with its own handling policy:
//! - [`ConfigError`]: fatal at startup.
//! - [`TransportError`]: fatal during the initial open, logged and skipped per tick afterwards.
//! - [`ParseError`]: the offending sample or persisted line is discarded.
//! - [`StorageError`]: logged, in-memory tiers stay authoritative.

use std::fmt;
use std::io;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    Config(ConfigError),
    Transport(TransportError),
    Parse(ParseError),
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Transport(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Storage(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io { path: PathBuf, source: io::Error },
    /// The file content is not valid TOML/JSON for the schema.
    Parse { path: PathBuf, message: String },
    /// Baud rate outside the supported set.
    UnsupportedBaudRate(u32),
    /// A field is present but its value is unusable.
    Invalid { field: &'static str, reason: String },
    /// The configured serial backend is not compiled into this build.
    BackendUnavailable(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "failed to parse {}: {message}", path.display())
            }
            Self::UnsupportedBaudRate(rate) => {
                write!(f, "unsupported baud rate {rate} (supported: 9600, 115200)")
            }
            Self::Invalid { field, reason } => write!(f, "invalid `{field}`: {reason}"),
            Self::BackendUnavailable(name) => {
                write!(f, "serial backend `{name}` is not available in this build")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum TransportError {
    /// Opening or configuring the device failed. Carries the OS diagnostic.
    Open { device: String, message: String },
    /// Operation requires the `Open` state.
    NotOpen,
    Read(String),
    Write(String),
    /// Fewer bytes were written than requested.
    ShortWrite { written: usize, expected: usize },
    /// The line buffer filled up before a newline arrived.
    LineTooLong { capacity: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { device, message } => {
                write!(f, "failed to open serial port {device}: {message}")
            }
            Self::NotOpen => write!(f, "port not open"),
            Self::Read(msg) => write!(f, "read failed: {msg}"),
            Self::Write(msg) => write!(f, "write failed: {msg}"),
            Self::ShortWrite { written, expected } => {
                write!(f, "write failed: {written} of {expected} bytes written")
            }
            Self::LineTooLong { capacity } => {
                write!(f, "no newline within {capacity} bytes, line discarded")
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The sensor sent something that is not a decimal number.
    Sample(String),
    /// A tier file line is not `<timestamp> <temperature>`.
    TierLine { line: usize, content: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sample(text) => write!(f, "malformed sample {text:?}"),
            Self::TierLine { line, content } => {
                write!(f, "malformed tier line {line}: {content:?}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct StorageError {
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
