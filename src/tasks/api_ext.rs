use crate::{
    api::Api,
    cron_ext::{parse_schedule, round_to_minute},
    database::Database,
    error::Error as TaskError,
    tasks::{Task, TaskRunStatus, TaskStatus},
};
use anyhow::{bail, Context};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Result of a successful scheduling tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleTaskResult {
    pub task_id: Uuid,
    pub scheduler_job_id: String,
    pub cron_expression: String,
    pub next_execution: Option<OffsetDateTime>,
    pub task_description: String,
}

/// Result of a successful deletion tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteTaskResult {
    pub task_id: Uuid,
    pub scheduler_job_removed: bool,
    pub deleted_at: OffsetDateTime,
}

/// The latest run summary embedded in an execution status lookup.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRunSummary {
    pub run_id: Uuid,
    pub status: TaskRunStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Wire shape of `api.tasks().execution_status(task_id)`'s persisted task row.
#[derive(Debug, Clone, Serialize)]
pub struct TaskExecutionStatus {
    pub task_id: Uuid,
    pub task_status: TaskStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub cron_expression: String,
    pub scheduler_job_id: Option<String>,
    pub start_time: Option<OffsetDateTime>,
    pub expiry_time: Option<OffsetDateTime>,
    pub latest_run: Option<TaskRunSummary>,
}

/// Extension methods for the agent-facing scheduling and deletion tools, and the execution
/// status lookup. Exposed as plain async methods on the shared `Api` handle - there is no HTTP
/// route for any of these; the agent calls them directly.
pub struct TasksApi<'a> {
    api: &'a Api,
}

impl<'a> TasksApi<'a> {
    pub fn new(api: &'a Api) -> Self {
        Self { api }
    }

    /// Schedules a future re-execution of the email request that triggered this invocation.
    /// `email_id` correlates the task back to the originating sender mailbox; `scheduled_task_id`
    /// is the current request's own re-entry marker, used to refuse recursive scheduling.
    #[allow(clippy::too_many_arguments)]
    pub async fn schedule(
        &self,
        email_id: &str,
        email_request: &crate::tasks::EmailRequest,
        cron_expression: &str,
        distilled_future_task_instructions: String,
        task_description: String,
        next_run_time: Option<OffsetDateTime>,
    ) -> anyhow::Result<ScheduleTaskResult> {
        // Step 1: no recursive scheduling.
        if email_request.scheduled_task_id.is_some() {
            bail!(TaskError::client(
                "A scheduled re-execution cannot itself schedule a future task."
            ));
        }

        // Step 2: validate cron, round any supplied next-run-time.
        let schedule = parse_schedule(cron_expression)
            .map_err(|err| TaskError::client(format!("Invalid cron expression: {err}")))?;
        let next_run_time = next_run_time.map(round_to_minute);

        // Step 3: rewrite handle/alias and attach distilled instructions.
        let mut rewritten_request = email_request.clone();
        rewritten_request.handle = self.api.config.ingress.generic_ask_handle.clone();
        rewritten_request.distilled_future_task_instructions =
            Some(distilled_future_task_instructions);

        // Step 4: insert the task row in INITIALISED.
        let task_id = Uuid::now_v7();
        let task = self
            .api
            .db
            .create_task(
                task_id,
                email_id,
                cron_expression,
                &rewritten_request,
                next_run_time,
                None,
            )
            .await
            .with_context(|| "Failed to persist scheduled task.")?;

        // Step 5: register the scheduler job, promoting on success or rolling back on failure.
        match self.api.scheduler.register(&task).await {
            Ok(scheduler_job_id) => {
                self.api.db.activate_task(task_id, &scheduler_job_id).await?;
                let now = Database::utc_now()?;
                let next_execution = crate::cron_ext::next_occurrence(&schedule, now);
                Ok(ScheduleTaskResult {
                    task_id,
                    scheduler_job_id,
                    cron_expression: cron_expression.to_string(),
                    next_execution,
                    task_description,
                })
            }
            Err(err) => {
                self.api.db.hard_delete_task(task_id).await?;
                Err(err).with_context(|| "Failed to register scheduler job; task was rolled back.")
            }
        }
    }

    /// Deletes a task on the requester's behalf.
    pub async fn delete(&self, requesting_email: &str, task_id: Uuid) -> anyhow::Result<DeleteTaskResult> {
        let Some(task) = self.api.db.get_task(task_id).await? else {
            bail!(TaskError::not_found(format!("Task '{task_id}' not found.")));
        };

        let Some(email_request) = &task.email_request else {
            bail!(TaskError::client(format!(
                "Task '{task_id}' has no stored request payload to verify ownership against."
            )));
        };

        if !email_request
            .from_email
            .eq_ignore_ascii_case(requesting_email)
        {
            bail!(TaskError::permission_denied(format!(
                "'{requesting_email}' does not own task '{task_id}'."
            )));
        }

        let scheduler_job_removed = if let Some(scheduler_job_id) = task.scheduler_job_id.as_deref() {
            match self
                .api
                .scheduler
                .unregister(task_id, Some(scheduler_job_id))
                .await
            {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(task.id = %task_id, "Failed to remove scheduler job during task deletion: {err:?}");
                    false
                }
            }
        } else {
            false
        };

        self.api.db.delete_task(task_id).await?;
        let deleted_at = Database::utc_now()?;

        Ok(DeleteTaskResult {
            task_id,
            scheduler_job_removed,
            deleted_at,
        })
    }

    /// Looks up a task's wire-shape execution status.
    pub async fn execution_status(&self, task_id: Uuid) -> anyhow::Result<TaskExecutionStatus> {
        let Some(task) = self.api.db.get_task(task_id).await? else {
            bail!(TaskError::not_found(format!("Task '{task_id}' not found.")));
        };

        let latest_run = self
            .api
            .db
            .latest_task_run(task_id)
            .await?
            .map(|run| TaskRunSummary {
                run_id: run.run_id,
                status: run.status,
                created_at: run.created_at,
                updated_at: run.updated_at,
            });

        Ok(task_execution_status(task, latest_run))
    }
}

fn task_execution_status(task: Task, latest_run: Option<TaskRunSummary>) -> TaskExecutionStatus {
    TaskExecutionStatus {
        task_id: task.task_id,
        task_status: task.status,
        created_at: task.created_at,
        updated_at: task.updated_at,
        cron_expression: task.cron_expression,
        scheduler_job_id: task.scheduler_job_id,
        start_time: task.start_time,
        expiry_time: task.expiry_time,
        latest_run,
    }
}

#[cfg(test)]
mod tests {
    use crate::{api::tests::mock_api, tasks::email_request::tests::mock_email_request};
    use sqlx::PgPool;

    #[sqlx::test]
    async fn schedules_a_task_and_promotes_it_to_active(pool: PgPool) -> anyhow::Result<()> {
        let api = mock_api(pool).await?;
        let result = api
            .tasks()
            .schedule(
                "alice@new-corp.test",
                &mock_email_request(),
                "30 9 * * 1",
                "Summarise this thread again next Monday.".to_string(),
                "Weekly summary".to_string(),
                None,
            )
            .await?;

        let task = api.db.get_task(result.task_id).await?.unwrap();
        assert_eq!(task.status, crate::tasks::TaskStatus::Active);
        assert_eq!(
            task.email_request.as_ref().unwrap().handle,
            api.config.ingress.generic_ask_handle
        );

        Ok(())
    }

    #[sqlx::test]
    async fn refuses_to_schedule_from_a_scheduled_reentry(pool: PgPool) -> anyhow::Result<()> {
        let api = mock_api(pool).await?;
        let mut request = mock_email_request();
        request.scheduled_task_id = Some(uuid::Uuid::now_v7());

        let result = api
            .tasks()
            .schedule(
                "alice@new-corp.test",
                &request,
                "30 9 * * 1",
                "instructions".to_string(),
                "desc".to_string(),
                None,
            )
            .await;

        assert!(result.is_err());
        Ok(())
    }

    #[sqlx::test]
    async fn deletion_rejects_non_owners(pool: PgPool) -> anyhow::Result<()> {
        let api = mock_api(pool).await?;
        let result = api
            .tasks()
            .schedule(
                "alice@new-corp.test",
                &mock_email_request(),
                "30 9 * * 1",
                "instructions".to_string(),
                "desc".to_string(),
                None,
            )
            .await?;

        let deletion = api.tasks().delete("mallory@evil.test", result.task_id).await;
        assert!(deletion.is_err());

        api.tasks().delete("alice@new-corp.test", result.task_id).await?;

        let task = api.db.get_task(result.task_id).await?.unwrap();
        assert_eq!(task.status, crate::tasks::TaskStatus::Deleted);
        assert!(task.email_request.is_none());

        Ok(())
    }
}
