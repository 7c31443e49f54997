use crate::{
    scheduler::{job::build_job, Scheduler, SchedulerRuntime},
    tasks::Task,
};
use std::{collections::HashMap, sync::Mutex};
use std::sync::Arc;
use tokio_cron_scheduler::JobScheduler;
use tracing::warn;
use uuid::Uuid;

/// Capability to add/remove a task's scheduler job, handed to `Api` so the scheduling and
/// deletion tools never need to reach into the long-lived `Scheduler` directly (which, in
/// a multi-process deployment, might not even be running in this process).
#[derive(Clone)]
pub enum SchedulerRegistrar {
    /// A scheduler is running in this very process; jobs are added straight to it.
    Attached {
        inner: JobScheduler,
        runtime: SchedulerRuntime,
        known_task_jobs: Arc<Mutex<HashMap<Uuid, Uuid>>>,
    },
    /// No scheduler runs here. A temporary one, bound to the same store, is spun up just long
    /// enough to persist the job, then stopped.
    Detached(SchedulerRuntime),
}

impl SchedulerRegistrar {
    /// Registers a scheduler job for `task`, returning the opaque job id to persist on the row.
    pub async fn register(&self, task: &Task) -> anyhow::Result<String> {
        match self {
            Self::Attached {
                inner,
                runtime,
                known_task_jobs,
            } => {
                let job_id = super::register_job(inner, runtime, known_task_jobs, task).await?;
                Ok(job_id.to_string())
            }
            Self::Detached(runtime) => {
                let temp = Scheduler::build_job_scheduler(&runtime.db_config).await?;
                let job = build_job(task, runtime.clone())?;
                let job_id = temp.add(job).await?;
                if let Err(err) = temp.shutdown().await {
                    warn!("Failed to shut down temporary scheduler cleanly: {err:?}");
                }
                Ok(job_id.to_string())
            }
        }
    }

    /// Removes a task's scheduler job, if any.
    pub async fn unregister(&self, task_id: Uuid, scheduler_job_id: Option<&str>) -> anyhow::Result<()> {
        let explicit = scheduler_job_id.and_then(|id| Uuid::parse_str(id).ok());
        match self {
            Self::Attached {
                inner,
                known_task_jobs,
                ..
            } => super::unregister_job(inner, known_task_jobs, task_id, explicit).await,
            Self::Detached(runtime) => {
                let Some(job_id) = explicit else {
                    return Ok(());
                };
                let temp = Scheduler::build_job_scheduler(&runtime.db_config).await?;
                let _ = temp.remove(&job_id).await;
                if let Err(err) = temp.shutdown().await {
                    warn!("Failed to shut down temporary scheduler cleanly: {err:?}");
                }
                Ok(())
            }
        }
    }
}
