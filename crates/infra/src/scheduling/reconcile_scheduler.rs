//! Periodic reconciliation scheduler.
//!
//! Runs an injected [`ScheduledJob`] every `interval`. Each run gets its own
//! [`RunControl`], which is cancelled when the run exceeds `run_timeout` or
//! the scheduler stops. Runs never overlap: the next tick is scheduled only
//! after the previous run returned.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use calsync_infra::scheduling::{ReconcileScheduler, ReconcileSchedulerConfig, ScheduledJob};
//!
//! # async fn example(job: Arc<dyn ScheduledJob>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReconcileSchedulerConfig {
//!     interval: Duration::from_secs(3600),
//!     ..ReconcileSchedulerConfig::default()
//! };
//! let mut scheduler = ReconcileScheduler::new(job, config)?;
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use calsync_core::RunControl;
use calsync_domain::{Result, SyncConfig};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Unit of work run on every tick
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    /// Run once. Implementations should honour `control` checkpoints.
    async fn run(&self, control: RunControl) -> Result<()>;
}

type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

#[derive(Debug, Clone)]
pub struct ReconcileSchedulerConfig {
    pub interval: Duration,
    /// Upper bound on a single run
    pub run_timeout: Duration,
    /// Run once immediately instead of waiting for the first interval
    pub run_on_start: bool,
    /// How long `stop` waits for the loop to exit
    pub join_timeout: Duration,
}

impl Default for ReconcileSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(calsync_domain::constants::DEFAULT_RECONCILE_INTERVAL_SECS),
            run_timeout: Duration::from_secs(calsync_domain::constants::DEFAULT_RECONCILE_TIMEOUT_SECS),
            run_on_start: false,
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&SyncConfig> for ReconcileSchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.reconcile_interval_secs),
            run_timeout: Duration::from_secs(config.reconcile_timeout_secs),
            ..Self::default()
        }
    }
}

pub struct ReconcileScheduler {
    job: Arc<dyn ScheduledJob>,
    config: ReconcileSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
    completed_runs: Arc<AtomicU64>,
}

impl ReconcileScheduler {
    pub fn new(job: Arc<dyn ScheduledJob>, config: ReconcileSchedulerConfig) -> SchedulerResult<Self> {
        if config.interval.is_zero() {
            return Err(SchedulerError::InvalidConfig("interval must be positive".into()));
        }
        if config.run_timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig("run_timeout must be positive".into()));
        }

        Ok(Self {
            job,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
            completed_runs: Arc::new(AtomicU64::new(0)),
        })
    }

    #[instrument(skip(self), fields(job = self.job.name()))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        // Fresh token so the scheduler can be restarted after stop
        self.cancellation_token = CancellationToken::new();

        let job = Arc::clone(&self.job);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();
        let completed = Arc::clone(&self.completed_runs);

        let handle = tokio::spawn(async move {
            Self::run_loop(job, config, cancel, completed).await;
        });
        *self.task_handle.lock().await = Some(handle);

        info!(interval_secs = self.config.interval.as_secs(), "reconcile scheduler started");
        Ok(())
    }

    #[instrument(skip(self), fields(job = self.job.name()))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let duration = self.config.join_timeout;
            tokio::time::timeout(duration, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { duration })??;
        }

        info!("reconcile scheduler stopped");
        Ok(())
    }

    /// Running while the loop task exists and has not finished
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Runs that returned (successfully or not) since construction
    pub fn completed_runs(&self) -> u64 {
        self.completed_runs.load(Ordering::SeqCst)
    }

    async fn run_loop(
        job: Arc<dyn ScheduledJob>,
        config: ReconcileSchedulerConfig,
        cancel: CancellationToken,
        completed: Arc<AtomicU64>,
    ) {
        if config.run_on_start {
            Self::run_once(job.as_ref(), &config, &cancel).await;
            completed.fetch_add(1, Ordering::SeqCst);
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("reconcile loop cancelled");
                    break;
                }
                () = tokio::time::sleep(config.interval) => {
                    Self::run_once(job.as_ref(), &config, &cancel).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    async fn run_once(job: &dyn ScheduledJob, config: &ReconcileSchedulerConfig, cancel: &CancellationToken) {
        let control = RunControl::new();
        let started = Instant::now();

        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                control.cancel();
                None
            }
            result = tokio::time::timeout(config.run_timeout, job.run(control.clone())) => Some(result),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Some(Ok(Ok(()))) => info!(job = job.name(), elapsed_ms, "scheduled run finished"),
            Some(Ok(Err(err))) => {
                error!(job = job.name(), elapsed_ms, error = %err, "scheduled run failed");
            }
            Some(Err(_)) => {
                control.cancel();
                warn!(
                    job = job.name(),
                    timeout_secs = config.run_timeout.as_secs(),
                    "scheduled run timed out"
                );
            }
            None => debug!(job = job.name(), "scheduled run interrupted by shutdown"),
        }
    }
}

impl Drop for ReconcileScheduler {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
