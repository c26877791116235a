//! ==============================================================================
//! executor.rs - periodic trigger + single worker
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     the two scheduling primitives the service is built from.
//!
//!     - PeriodicExecutor: fires a callback on a fixed interval until stopped.
//!       the cancellation token is checked before every invocation, so a
//!       stopped executor never fires again.
//!     - Invoker/Worker: a bounded queue drained by exactly one task. jobs
//!       run one at a time, in submission order, on the blocking pool (they
//!       do file io). submitting never waits: a full queue rejects the job.
//!       stopping the worker lets the job in progress finish; queued jobs
//!       that have not started are dropped.
//! ```
//!
//! ==============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

type Job = Box<dyn FnOnce() + Send + 'static>;

// ==============================================================================
// periodic executor
// ==============================================================================

pub struct PeriodicExecutor {
    callback: Arc<dyn Fn() + Send + Sync>,
    period: Duration,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PeriodicExecutor {
    pub fn new<F>(callback: F, period: Duration) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            period,
            token: CancellationToken::new(),
            task: None,
        }
    }

    /// Start ticking. The first tick fires immediately. Calling `start` on a
    /// running or stopped executor does nothing.
    pub fn start(&mut self) {
        if self.task.is_some() || self.token.is_cancelled() {
            return;
        }
        let callback = Arc::clone(&self.callback);
        let token = self.token.clone();
        let period = self.period;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                callback();
            }
            tracing::debug!("periodic executor stopped");
        }));
    }

    /// Cancel future ticks without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel future ticks and wait for the tick loop to exit.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "periodic executor task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some() && !self.token.is_cancelled()
    }
}

// ==============================================================================
// single worker
// ==============================================================================

/// Why [`Invoker::run`] turned a job away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// `capacity` jobs are already waiting.
    Full,
    /// The worker has shut down.
    Closed,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full => write!(f, "worker queue full"),
            QueueError::Closed => write!(f, "worker stopped"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Submission handle for the worker queue. Cheap to clone.
#[derive(Clone)]
pub struct Invoker {
    tx: mpsc::Sender<Job>,
}

impl Invoker {
    /// Queue a job without waiting for room.
    pub fn run<F>(&self, job: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.try_send(Box::new(job)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// The task draining an [`Invoker`]'s queue.
pub struct Worker {
    rx: Option<mpsc::Receiver<Job>>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Worker {
    /// Create a queue holding at most `capacity` waiting jobs (minimum 1).
    /// Jobs may be submitted right away; they run once [`Worker::start`] is
    /// called inside a tokio runtime.
    pub fn new(capacity: usize) -> (Invoker, Worker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = Worker { rx: Some(rx), token: CancellationToken::new(), task: None };
        (Invoker { tx }, worker)
    }

    pub fn start(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        let token = self.token.clone();

        self.task = Some(tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };
                // not raced against the token: a started job always completes
                if let Err(e) = tokio::task::spawn_blocking(job).await {
                    tracing::error!(error = %e, "worker job panicked");
                }
            }
            tracing::debug!("worker stopped");
        }));
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stop taking new jobs and wait for the one in progress.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "worker task failed");
            }
        }
    }
}
