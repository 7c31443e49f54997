use crate::{
    cron_ext::{is_one_shot, next_occurrence, parse_schedule},
    database::Database,
    scheduler::SchedulerRuntime,
    tasks::Task,
};
use std::time::Duration as StdDuration;
use tokio_cron_scheduler::Job;
use tracing::error;

/// Builds a runnable `tokio_cron_scheduler` job for a single task. One-shot tasks
/// are scheduled as a single relative-delay firing; recurring tasks get the task's own
/// cron expression, with the literal seconds field this codebase's cron dialect never carries
/// prepended so the 5-field POSIX expression is accepted by the scheduler's own parser.
pub fn build_job(task: &Task, runtime: SchedulerRuntime) -> anyhow::Result<Job> {
    let task_id = task.task_id;

    if is_one_shot(&task.cron_expression) {
        let schedule = parse_schedule(&task.cron_expression)?;
        let now = Database::utc_now()?;
        let delay = match next_occurrence(&schedule, now) {
            Some(next) => (next - now).max(time::Duration::ZERO),
            None => time::Duration::ZERO,
        };
        let delay = StdDuration::from_secs(delay.whole_seconds().max(0) as u64);

        Ok(Job::new_one_shot_async(delay, move |_job_id, _scheduler| {
            let runtime = runtime.clone();
            Box::pin(async move {
                if let Err(err) = runtime.execute_scheduled_task(task_id).await {
                    error!(task.id = %task_id, "Scheduled task execution failed: {err:?}");
                }
            })
        })?)
    } else {
        let schedule = format!("0 {}", task.cron_expression);
        Ok(Job::new_async(schedule.as_str(), move |_job_id, _scheduler| {
            let runtime = runtime.clone();
            Box::pin(async move {
                if let Err(err) = runtime.execute_scheduled_task(task_id).await {
                    error!(task.id = %task_id, "Scheduled task execution failed: {err:?}");
                }
            })
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::build_job;
    use crate::{
        scheduler::{tests::mock_scheduler_runtime, Scheduler},
        tasks::{Task, TaskStatus},
    };
    use sqlx::PgPool;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn mock_task(cron_expression: &str) -> Task {
        Task {
            task_id: Uuid::now_v7(),
            email_id: "alice@new-corp.test".to_string(),
            cron_expression: cron_expression.to_string(),
            status: TaskStatus::Active,
            email_request: None,
            scheduler_job_id: None,
            start_time: None,
            expiry_time: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[sqlx::test]
    async fn a_recurring_cron_expression_builds_an_addable_job(pool: PgPool) -> anyhow::Result<()> {
        let runtime = mock_scheduler_runtime(pool).await?;
        let inner = Scheduler::build_job_scheduler(&runtime.db_config).await?;

        let job = build_job(&mock_task("30 9 * * 1"), runtime)?;
        let job_id = inner.add(job).await?;
        inner.remove(&job_id).await?;

        Ok(())
    }

    #[sqlx::test]
    async fn a_fully_literal_cron_expression_builds_a_one_shot_job(pool: PgPool) -> anyhow::Result<()> {
        let runtime = mock_scheduler_runtime(pool).await?;
        let inner = Scheduler::build_job_scheduler(&runtime.db_config).await?;

        let job = build_job(&mock_task("0 9 15 6 *"), runtime)?;
        let job_id = inner.add(job).await?;
        inner.remove(&job_id).await?;

        Ok(())
    }
}
