//! Application context - dependency injection container

pub mod run_registry;
pub mod runner;

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::{CoordinatorPorts, RunControl, SyncRunCoordinator, TaskTracker};
use calsync_domain::{Config, Result, SyncError};
use calsync_infra::{
    CalendarApiClient, CalendarBindingGateway, DbManager, ReconcileScheduler,
    ReconcileSchedulerConfig, ScheduledJob, SqliteAggregateRepository, SqliteBindingRepository,
    SqliteMappingRepository, SqliteRosterRepository, SqliteScheduleRepository, SqliteTaskTracker,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use run_registry::RunRegistry;
pub use runner::{BulkReconcileReport, RetriedRun, RunStatusView, SyncRunner, TrackedRun};

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub coordinator: Arc<SyncRunCoordinator>,
    pub tasks: Arc<dyn TaskTracker>,
    pub runner: SyncRunner,

    reconcile_scheduler: Mutex<Option<ReconcileScheduler>>,
}

/// Scheduled job reconciling every mapped course under the bulk task key
struct ReconcileAllJob {
    runner: SyncRunner,
}

#[async_trait]
impl ScheduledJob for ReconcileAllJob {
    fn name(&self) -> &str {
        "reconcile_all"
    }

    async fn run(&self, control: RunControl) -> Result<()> {
        let run = self.runner.run_bulk(None, control).await?;
        info!(
            task_id = %run.task_id,
            succeeded = run.outcome.succeeded,
            failed = run.outcome.failed,
            "scheduled reconciliation finished"
        );
        Ok(())
    }
}

impl AppContext {
    /// Open the database, apply migrations and wire every adapter
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(DbManager::from_config(&config.database)?);
        db.run_migrations()?;

        let client = Arc::new(CalendarApiClient::from_config(&config.calendar)?);
        let ports = CoordinatorPorts {
            schedules: Arc::new(SqliteScheduleRepository::new(Arc::clone(&db))),
            aggregates: Arc::new(SqliteAggregateRepository::new(Arc::clone(&db))),
            rosters: Arc::new(SqliteRosterRepository::new(Arc::clone(&db))),
            bindings: Arc::new(CalendarBindingGateway::new(
                Arc::new(SqliteBindingRepository::new(Arc::clone(&db))),
                Arc::clone(&client),
            )),
            mappings: Arc::new(SqliteMappingRepository::new(Arc::clone(&db))),
            grants: client,
        };
        let coordinator = Arc::new(SyncRunCoordinator::from_config(ports, &config.sync));

        let tasks: Arc<dyn TaskTracker> = Arc::new(SqliteTaskTracker::new(Arc::clone(&db)));
        let runner = SyncRunner::new(
            Arc::clone(&coordinator),
            Arc::clone(&tasks),
            Arc::new(RunRegistry::new()),
            config.sync.removal_batch_size,
        );

        info!(database = %db.path().display(), calendar = %config.calendar.base_url, "context ready");

        Ok(Self {
            config,
            db,
            coordinator,
            tasks,
            runner,
            reconcile_scheduler: Mutex::new(None),
        })
    }

    /// Start periodic reconciliation.
    ///
    /// Returns `false` when it is disabled in the configuration.
    pub async fn start_reconcile_scheduler(&self) -> Result<bool> {
        if !self.config.sync.reconcile_enabled {
            info!("periodic reconciliation disabled");
            return Ok(false);
        }

        let mut slot = self.reconcile_scheduler.lock().await;
        if slot.is_some() {
            return Err(SyncError::ConcurrencyConflict(
                "reconcile scheduler already started".into(),
            ));
        }

        let job: Arc<dyn ScheduledJob> = Arc::new(ReconcileAllJob { runner: self.runner.clone() });
        let mut scheduler =
            ReconcileScheduler::new(job, ReconcileSchedulerConfig::from(&self.config.sync))?;
        scheduler.start().await?;
        *slot = Some(scheduler);
        Ok(true)
    }

    pub async fn is_scheduler_running(&self) -> bool {
        self.reconcile_scheduler.lock().await.as_ref().is_some_and(ReconcileScheduler::is_running)
    }

    /// Stop the scheduler and cancel every live run
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(mut scheduler) = self.reconcile_scheduler.lock().await.take() {
            if let Err(err) = scheduler.stop().await {
                warn!(error = %err, "reconcile scheduler did not stop cleanly");
            }
        }

        let cancelled = self.runner.runs().cancel_all();
        if cancelled > 0 {
            info!(cancelled, "cancelled live runs on shutdown");
        }
        Ok(())
    }
}
