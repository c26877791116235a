//! ==============================================================================
//! service.rs - measurement pipeline
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     owns the serial transport, the reading processor and the aggregation
//!     cache, and runs the measurement loop:
//!
//!         tick ──► read_line ──► parse ──► process ──► worker: process_temperature
//!         (periodic)   (blocking pool, one read at a time)     (single worker)
//!
//!     the read happens on the blocking pool so a silent device never stalls
//!     the tick loop. if the previous read is still pending when the next tick
//!     fires, that tick is skipped. accepted readings are handed to the single
//!     worker while the transport lock is still held, so they reach the cache
//!     in the order they were read. the worker queue is bounded: while it is
//!     full (the disk is stalled, say) new readings are logged and dropped.
//!
//! failure policy:
//!     - startup: an unopenable port or bad configuration is returned to the
//!       caller (fatal).
//!     - per tick: transport and parse errors are logged and the tick is
//!       skipped. the next tick is the retry.
//! ```
//!
//! ==============================================================================

use crate::cache::AggregationCache;
use crate::config::ServiceConfig;
use crate::domain::{Reading, Tier};
use crate::error::Error;
use crate::executor::{Invoker, PeriodicExecutor, QueueError, Worker};
use crate::processor::{parse_sample, ReadingProcessor};
use crate::storage::{FileStorage, TierStorage};
use crate::transport::{backend_for, LineTransport, SerialBackend};
use chrono::Utc;
use std::sync::{Arc, Mutex, TryLockError, Weak};
use std::time::Duration;

pub type SerialTransport = LineTransport<Box<dyn SerialBackend>>;

/// Readings allowed to wait for the worker before new ones are dropped.
pub const WORKER_QUEUE_CAPACITY: usize = 16;

/// Shared by the tick callback (through a weak handle) and the service.
struct Pipeline {
    transport: Mutex<SerialTransport>,
    processor: ReadingProcessor,
    cache: Arc<AggregationCache>,
    invoker: Invoker,
    show_readings: bool,
}

pub struct Service {
    pipeline: Arc<Pipeline>,
    executor: PeriodicExecutor,
    worker: Worker,
}

impl Service {
    /// Build the service from configuration: pick the serial backend, open
    /// the port and load the tier files.
    pub fn new(config: &ServiceConfig, processor: ReadingProcessor) -> crate::Result<Self> {
        let backend = backend_for(&config.serial, &config.simulator)?;
        let storage = Arc::new(FileStorage::new(&config.storage.file_system));
        Self::with_parts(
            LineTransport::new(backend),
            storage,
            processor,
            config.measure_interval(),
            config.logging.show_readings,
        )
    }

    /// Assemble a service from already-built parts. Opens the transport.
    pub fn with_parts(
        mut transport: SerialTransport,
        storage: Arc<dyn TierStorage>,
        processor: ReadingProcessor,
        interval: Duration,
        show_readings: bool,
    ) -> crate::Result<Self> {
        transport.open()?;

        let cache = Arc::new(AggregationCache::load(storage));
        for tier in Tier::ALL {
            tracing::debug!(%tier, entries = cache.len(tier), "tier restored");
        }

        let (invoker, worker) = Worker::new(WORKER_QUEUE_CAPACITY);
        let pipeline = Arc::new(Pipeline {
            transport: Mutex::new(transport),
            processor,
            cache,
            invoker,
            show_readings,
        });

        let handle: Weak<Pipeline> = Arc::downgrade(&pipeline);
        let executor = PeriodicExecutor::new(
            move || {
                if let Some(pipeline) = handle.upgrade() {
                    Pipeline::schedule_measurement(pipeline);
                }
            },
            interval,
        );

        Ok(Self { pipeline, executor, worker })
    }

    /// Start the worker and the periodic ticks. Must be called inside a
    /// tokio runtime.
    pub fn start(&mut self) {
        self.worker.start();
        self.executor.start();
        tracing::info!("measurement started");
    }

    /// Cancel future ticks, let the reading being processed finish, then
    /// close the port (unless a read is still blocked on it).
    pub async fn stop(&mut self) {
        self.executor.stop().await;
        self.worker.stop().await;

        match self.pipeline.transport.try_lock() {
            Ok(mut transport) => transport.close(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().close(),
            Err(TryLockError::WouldBlock) => {
                tracing::warn!("serial read still pending, port closes when it returns")
            }
        }
        tracing::info!("measurement stopped");
    }

    /// One measurement step, run synchronously on the calling thread.
    ///
    /// Returns the reading handed to the worker, if any.
    pub fn measure_once(&self) -> crate::Result<Option<Reading>> {
        self.pipeline.measure()
    }

    pub fn cache(&self) -> &AggregationCache {
        &self.pipeline.cache
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.executor.cancel();
        self.worker.cancel();
    }
}

impl Pipeline {
    fn schedule_measurement(pipeline: Arc<Pipeline>) {
        tokio::task::spawn_blocking(move || pipeline.measure_logged());
    }

    fn measure_logged(&self) {
        match self.measure() {
            Ok(_) => {}
            Err(Error::Parse(e)) => tracing::warn!(error = %e, "discarding sample"),
            Err(e) => tracing::error!(error = %e, "measurement failed, skipping tick"),
        }
    }

    fn measure(&self) -> crate::Result<Option<Reading>> {
        let mut transport = match self.transport.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("previous read still pending, skipping tick");
                return Ok(None);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let line = transport.read_line()?;
        if line.trim().is_empty() {
            return Ok(None);
        }

        let value = parse_sample(&line)?;
        let Some(reading) = self.processor.process(value, Utc::now()) else {
            tracing::warn!(value, device = transport.device(), "sample outside sensor range, rejected");
            return Ok(None);
        };

        if self.show_readings {
            tracing::info!(temperature = reading.temperature, at = %reading.timestamp, "reading");
        } else {
            tracing::debug!(temperature = reading.temperature, at = %reading.timestamp, "reading");
        }

        let cache = Arc::clone(&self.cache);
        let queued = self.invoker.run(move || {
            cache.process_temperature(reading);
        });
        match queued {
            Ok(()) => {}
            Err(QueueError::Full) => {
                tracing::warn!(temperature = reading.temperature, "worker busy, reading dropped");
                return Ok(None);
            }
            Err(QueueError::Closed) => {
                tracing::debug!("worker stopped, reading dropped");
                return Ok(None);
            }
        }
        // guard released here, after the hand-off
        drop(transport);
        Ok(Some(reading))
    }
}
