//! ==============================================================================
//! thermolog - serial temperature logger
//! ==============================================================================
//!
//! samples a temperature sensor over a line-oriented serial link and keeps
//! three retention tiers (raw 24h, hourly averages 30d, daily averages 360d)
//! mirrored to plain-text files so history survives restarts.
//!
//! layout:
//!     - transport/   serial backends + newline framing
//!     - processor    raw sample -> timestamped reading
//!     - cache        tier trimming and rollups
//!     - storage      tier file format, load/save
//!     - executor     periodic trigger + single worker
//!     - service      wires the above into the measurement loop
//!     - simulator    synthetic temperature waveform
//!
//! ==============================================================================

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod logging;
pub mod processor;
pub mod service;
pub mod simulator;
pub mod storage;
pub mod transport;

pub use cache::{AggregationCache, RollupOutcome};
pub use config::ServiceConfig;
pub use domain::{Reading, Tier};
pub use error::{Error, Result};
pub use processor::ReadingProcessor;
pub use service::Service;
pub use transport::{LineTransport, SerialBackend};
