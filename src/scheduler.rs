mod database_ext;
mod job;
mod registrar;
mod runtime;

pub use registrar::SchedulerRegistrar;
pub use runtime::SchedulerRuntime;

use crate::{config::DatabaseConfig, tasks::Task};
use job::build_job;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{
    JobScheduler, PostgresMetadataStore, PostgresNotificationStore, PostgresStore, SimpleJobCode,
    SimpleNotificationCode,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const SCHEDULER_JOBS_TABLE: &str = "scheduler_jobs";
const SCHEDULER_NOTIFICATIONS_TABLE: &str = "scheduler_notifications";
const SCHEDULER_NOTIFICATION_STATES_TABLE: &str = "scheduler_notification_states";

/// The long-lived scheduler runner for this process. Every `ACTIVE` task's own row, not
/// the job store, is the source of truth for what should be scheduled: at startup, and on every
/// refresh tick thereafter, the scheduler reconciles its in-memory job set against
/// `Database::active_tasks`, rather than replaying the job store's own persisted rows. Multiple
/// processes independently doing this and occasionally double-firing the same task is safe: the
/// `ACTIVE -> EXECUTING` transition is a single-row compare-and-swap, so only one firing per task
/// ever proceeds past that point.
pub struct Scheduler {
    inner: JobScheduler,
    runtime: SchedulerRuntime,
    known_task_jobs: Arc<Mutex<HashMap<Uuid, Uuid>>>,
}

fn connection_string(db_config: &DatabaseConfig) -> String {
    format!(
        "host={} port={} dbname={}{}",
        db_config.host,
        db_config.port,
        db_config.name,
        if let Some(password) = &db_config.password {
            format!(" user={} password={password}", db_config.username)
        } else {
            format!(" user={}", db_config.username)
        }
    )
}

async fn register_job(
    inner: &JobScheduler,
    runtime: &SchedulerRuntime,
    known_task_jobs: &Mutex<HashMap<Uuid, Uuid>>,
    task: &Task,
) -> anyhow::Result<Uuid> {
    let job = build_job(task, runtime.clone())?;
    let job_id = inner.add(job).await?;
    known_task_jobs
        .lock()
        .expect("known_task_jobs mutex was poisoned")
        .insert(task.task_id, job_id);
    Ok(job_id)
}

async fn unregister_job(
    inner: &JobScheduler,
    known_task_jobs: &Mutex<HashMap<Uuid, Uuid>>,
    task_id: Uuid,
    explicit_job_id: Option<Uuid>,
) -> anyhow::Result<()> {
    let job_id = known_task_jobs
        .lock()
        .expect("known_task_jobs mutex was poisoned")
        .remove(&task_id)
        .or(explicit_job_id);
    if let Some(job_id) = job_id {
        inner.remove(&job_id).await?;
    }
    Ok(())
}

/// Reconciles the in-memory job set against the current set of `ACTIVE` tasks: adds jobs for
/// tasks registered by another process (via `SchedulerRegistrar::Detached`) that this process
/// doesn't know about yet, and removes jobs for tasks that are no longer in an active status.
/// Logs only when something actually changed.
async fn refresh_tick(
    inner: &JobScheduler,
    runtime: &SchedulerRuntime,
    known_task_jobs: &Mutex<HashMap<Uuid, Uuid>>,
) -> anyhow::Result<()> {
    let active = runtime.db.active_tasks().await?;

    let mut added = 0usize;
    for task in &active {
        let already_known = known_task_jobs
            .lock()
            .expect("known_task_jobs mutex was poisoned")
            .contains_key(&task.task_id);
        if already_known {
            continue;
        }
        match register_job(inner, runtime, known_task_jobs, task).await {
            Ok(_) => added += 1,
            Err(err) => error!(task.id = %task.task_id, "Failed to pick up scheduler job during refresh: {err:?}"),
        }
    }

    // A known job is stale only once its task has left the active-status family entirely
    // (`TaskStatus::is_active`) - a task that is currently `EXECUTING` still owns a live job and
    // must not be swept just because it fell out of the literal `ACTIVE` set used above to decide
    // what to (re-)register.
    let task_statuses = runtime.db.task_statuses().await?;
    let stale: Vec<Uuid> = {
        let map = known_task_jobs
            .lock()
            .expect("known_task_jobs mutex was poisoned");
        map.keys()
            .filter(|task_id| {
                !task_statuses
                    .get(task_id)
                    .is_some_and(|status| status.is_active())
            })
            .copied()
            .collect()
    };
    for task_id in &stale {
        if let Err(err) = unregister_job(inner, known_task_jobs, *task_id, None).await {
            error!(task.id = %task_id, "Failed to remove stale scheduler job during refresh: {err:?}");
        }
    }

    if added > 0 || !stale.is_empty() {
        debug!(
            "Scheduler refresh sweep picked up {added} job(s) and dropped {} stale job(s).",
            stale.len()
        );
    }

    Ok(())
}

impl Scheduler {
    pub(super) async fn build_job_scheduler(db_config: &DatabaseConfig) -> anyhow::Result<JobScheduler> {
        let store = Arc::new(RwLock::new(PostgresStore::Created(connection_string(
            db_config,
        ))));
        let metadata_store = PostgresMetadataStore {
            store: store.clone(),
            init_tables: false,
            table: SCHEDULER_JOBS_TABLE.to_string(),
        };
        let notification_store = PostgresNotificationStore {
            store,
            init_tables: false,
            table: SCHEDULER_NOTIFICATIONS_TABLE.to_string(),
            states_table: SCHEDULER_NOTIFICATION_STATES_TABLE.to_string(),
        };

        Ok(JobScheduler::new_with_storage_and_code(
            Box::new(metadata_store),
            Box::new(notification_store),
            Box::<SimpleJobCode>::default(),
            Box::<SimpleNotificationCode>::default(),
            1000,
        )
        .await?)
    }

    /// Starts the scheduler: recovers any tasks interrupted by a previous shutdown, resumes
    /// every currently `ACTIVE` task, installs the internal refresh sweep, and starts ticking.
    pub async fn start(runtime: SchedulerRuntime) -> anyhow::Result<Self> {
        let inner = Self::build_job_scheduler(&runtime.db_config).await?;
        let known_task_jobs = Arc::new(Mutex::new(HashMap::new()));
        let scheduler = Self {
            inner,
            runtime,
            known_task_jobs,
        };

        if !scheduler.runtime.config.enabled {
            warn!("Scheduler is disabled - existing tasks won't be resumed and new jobs won't be scheduled.");
            return Ok(scheduler);
        }

        let recovered = scheduler.runtime.db.recover_interrupted_tasks().await?;
        if !recovered.is_empty() {
            info!(
                "Recovered {} task(s) interrupted by a previous shutdown.",
                recovered.len()
            );
        }

        let active = scheduler.runtime.db.active_tasks().await?;
        for task in &active {
            if let Err(err) = register_job(
                &scheduler.inner,
                &scheduler.runtime,
                &scheduler.known_task_jobs,
                task,
            )
            .await
            {
                error!(task.id = %task.task_id, "Failed to resume scheduler job: {err:?}");
            }
        }
        info!("Resumed {} active task(s).", active.len());

        // A refresh job left over from a previous instance of this process (or another process
        // entirely) is replaced rather than left to run alongside the new one.
        if let Some(stale_job_id) = scheduler.runtime.db.refresh_job_id().await? {
            let _ = scheduler.inner.remove(&stale_job_id).await;
        }

        let refresh_inner = scheduler.inner.clone();
        let refresh_runtime = scheduler.runtime.clone();
        let refresh_known = scheduler.known_task_jobs.clone();
        let refresh_job = tokio_cron_scheduler::Job::new_repeated_async(
            scheduler.runtime.config.refresh_interval,
            move |_job_id, _job_scheduler| {
                let inner = refresh_inner.clone();
                let runtime = refresh_runtime.clone();
                let known = refresh_known.clone();
                Box::pin(async move {
                    if let Err(err) = refresh_tick(&inner, &runtime, &known).await {
                        error!("Scheduler refresh sweep failed: {err:?}");
                    }
                })
            },
        )?;
        let refresh_job_id = scheduler.inner.add(refresh_job).await?;
        scheduler.runtime.db.set_refresh_job_id(refresh_job_id).await?;

        scheduler.inner.start().await?;
        Ok(scheduler)
    }

    /// Adds a scheduler job for `task` directly to this process's running scheduler.
    pub async fn add_task_job(&self, task: &Task) -> anyhow::Result<Uuid> {
        register_job(&self.inner, &self.runtime, &self.known_task_jobs, task).await
    }

    /// Removes `task`'s scheduler job, if one is known.
    pub async fn remove_task_job(&self, task_id: Uuid) -> anyhow::Result<()> {
        unregister_job(&self.inner, &self.known_task_jobs, task_id, None).await
    }

    /// Returns a handle other parts of the system (the scheduling/deletion tools) can register
    /// and unregister jobs through, without needing the full `Scheduler`.
    pub fn registrar(&self) -> SchedulerRegistrar {
        SchedulerRegistrar::Attached {
            inner: self.inner.clone(),
            runtime: self.runtime.clone(),
            known_task_jobs: self.known_task_jobs.clone(),
        }
    }

    /// Gracefully shuts the scheduler down, letting in-flight firings drain up to the configured
    /// timeout.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        tokio::time::timeout(self.runtime.config.shutdown_timeout, self.inner.shutdown()).await??;
        Ok(())
    }

    /// Returns the scheduler's current status.
    pub async fn status(&mut self) -> anyhow::Result<SchedulerStatus> {
        match self.inner.time_till_next_job().await {
            Ok(time_till_next_job) => Ok(SchedulerStatus {
                operational: self.runtime.config.enabled,
                time_till_next_job,
            }),
            Err(err) => {
                error!("Failed to get scheduler status: {err:?}");
                Ok(SchedulerStatus {
                    operational: false,
                    time_till_next_job: None,
                })
            }
        }
    }
}

/// Point-in-time status of the scheduler, exposed through `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub operational: bool,
    pub time_till_next_job: Option<std::time::Duration>,
}

#[cfg(test)]
pub mod tests {
    use super::{Scheduler, SchedulerRuntime};
    use crate::{config::SchedulerConfig, database::Database, http_client::create_http_client};
    use sqlx::PgPool;
    use std::{path::PathBuf, time::Duration};

    /// Builds a `SchedulerRuntime` for tests against an ephemeral Postgres database.
    pub async fn mock_scheduler_runtime(pool: PgPool) -> anyhow::Result<SchedulerRuntime> {
        let connect_options = pool.connect_options();
        let db_config = crate::config::DatabaseConfig {
            name: connect_options
                .get_database()
                .unwrap_or_default()
                .to_string(),
            host: connect_options.get_host().to_string(),
            port: connect_options.get_port(),
            username: connect_options.get_username().to_string(),
            password: None,
            max_connections: 10,
        };

        Ok(SchedulerRuntime::new(
            Database::create(pool).await?,
            create_http_client(Duration::from_secs(5))?,
            SchedulerConfig::default(),
            db_config,
            "test-api-key".to_string(),
            PathBuf::from("./attachments"),
        ))
    }

    #[sqlx::test]
    async fn starts_and_resumes_with_no_active_tasks(pool: PgPool) -> anyhow::Result<()> {
        let runtime = mock_scheduler_runtime(pool).await?;
        let scheduler = Scheduler::start(runtime).await?;
        scheduler.shutdown().await?;
        Ok(())
    }
}
