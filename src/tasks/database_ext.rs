mod raw_task;
mod raw_task_run;

use crate::{
    database::Database,
    tasks::{task_run::TaskRun, EmailRequest, Task, TaskRunStatus, TaskStatus},
};
use anyhow::{bail, Context};
use raw_task::RawTask;
use raw_task_run::RawTaskRun;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// CRUD and lifecycle-transition operations for `Task`/`TaskRun`. Every transition here is
/// a single short transaction - the scheduler executor never holds a row lock across the
/// self-callback HTTP request.
impl Database {
    /// Inserts a new `Task` row in `INITIALISED` status.
    pub async fn create_task(
        &self,
        task_id: Uuid,
        email_id: &str,
        cron_expression: &str,
        email_request: &EmailRequest,
        start_time: Option<OffsetDateTime>,
        expiry_time: Option<OffsetDateTime>,
    ) -> anyhow::Result<Task> {
        let now = Database::utc_now()?;
        let email_request_json = serde_json::to_value(email_request)
            .with_context(|| "Failed to serialize email request.")?;

        let raw_task = sqlx::query_as::<_, RawTask>(
            r#"
            INSERT INTO tasks (task_id, email_id, cron_expression, status, email_request, start_time, expiry_time, created_at, updated_at)
            VALUES ($1, $2, $3, 'initialised', $4, $5, $6, $7, $7)
            RETURNING task_id, email_id, cron_expression, status, email_request, scheduler_job_id, start_time, expiry_time, created_at, updated_at
            "#,
        )
        .bind(task_id)
        .bind(email_id)
        .bind(cron_expression)
        .bind(email_request_json)
        .bind(start_time)
        .bind(expiry_time)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| "Failed to insert task.")?;

        Task::try_from(raw_task)
    }

    /// Returns the task with the given id, if any.
    pub async fn get_task(&self, task_id: Uuid) -> anyhow::Result<Option<Task>> {
        let raw_task = sqlx::query_as::<_, RawTask>(
            r#"
            SELECT task_id, email_id, cron_expression, status, email_request, scheduler_job_id, start_time, expiry_time, created_at, updated_at
            FROM tasks WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| "Failed to fetch task.")?;

        raw_task.map(Task::try_from).transpose()
    }

    /// Promotes a task from `INITIALISED` to `ACTIVE` once its scheduler job has been
    /// registered.
    pub async fn activate_task(
        &self,
        task_id: Uuid,
        scheduler_job_id: &str,
    ) -> anyhow::Result<bool> {
        let now = Database::utc_now()?;
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'active', scheduler_job_id = $2, updated_at = $3
            WHERE task_id = $1 AND status = 'initialised'
            "#,
        )
        .bind(task_id)
        .bind(scheduler_job_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to activate task.")?;

        Ok(result.rows_affected() > 0)
    }

    /// Transitions a task from `ACTIVE` to `EXECUTING`. Returns `false` if the
    /// task wasn't `ACTIVE` (e.g. a duplicate firing raced in), in which case the caller must
    /// not proceed with the self-callback.
    pub async fn begin_task_execution(&self, task_id: Uuid) -> anyhow::Result<bool> {
        let now = Database::utc_now()?;
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'executing', updated_at = $2
            WHERE task_id = $1 AND status = 'active'
            "#,
        )
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to transition task to executing.")?;

        Ok(result.rows_affected() > 0)
    }

    /// Transitions a task to `FINISHED`, clearing `email_request` and `scheduler_job_id` to keep
    /// a terminal task's payload out of storage. Used both for one-shot completion and for
    /// past-expiry skips.
    pub async fn finish_task(&self, task_id: Uuid) -> anyhow::Result<()> {
        let now = Database::utc_now()?;
        sqlx::query(
            r#"
            UPDATE tasks SET status = 'finished', email_request = NULL, scheduler_job_id = NULL, updated_at = $2
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to finish task.")?;

        Ok(())
    }

    /// Returns a recurring task from `EXECUTING` back to `ACTIVE`, on either success or failure.
    pub async fn revert_task_to_active(&self, task_id: Uuid) -> anyhow::Result<()> {
        let now = Database::utc_now()?;
        sqlx::query(
            r#"
            UPDATE tasks SET status = 'active', updated_at = $2
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to revert task to active.")?;

        Ok(())
    }

    /// Clears a stale scheduler job binding for a task that is no longer active.
    pub async fn clear_stale_scheduler_job(&self, task_id: Uuid) -> anyhow::Result<()> {
        let now = Database::utc_now()?;
        sqlx::query(
            r#"
            UPDATE tasks SET scheduler_job_id = NULL, updated_at = $2
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to clear stale scheduler job.")?;

        Ok(())
    }

    /// Deletes a task from the requester's perspective: always transitions to
    /// `DELETED` regardless of current status, clearing `email_request` and
    /// `scheduler_job_id`. Ownership must already have been checked by the caller.
    pub async fn delete_task(&self, task_id: Uuid) -> anyhow::Result<bool> {
        let now = Database::utc_now()?;
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'deleted', email_request = NULL, scheduler_job_id = NULL, updated_at = $2
            WHERE task_id = $1 AND status != 'deleted'
            "#,
        )
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| "Failed to delete task.")?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes the row entirely; only used by the scheduling tool to roll back a task whose
    /// scheduler job failed to register.
    pub async fn hard_delete_task(&self, task_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .with_context(|| "Failed to hard-delete task.")?;
        Ok(())
    }

    /// Creates a new `TaskRun` directly in `IN_PROGRESS`. At most one
    /// `IN_PROGRESS` run may exist per task at a time; this is enforced by the scheduler's
    /// `max_instances = 1` and the `EXECUTING` status guard, not by a DB constraint.
    pub async fn create_task_run(&self, task_id: Uuid) -> anyhow::Result<TaskRun> {
        let now = Database::utc_now()?;
        let run_id = Uuid::now_v7();
        let raw_run = sqlx::query_as::<_, RawTaskRun>(
            r#"
            INSERT INTO task_runs (run_id, task_id, status, created_at, updated_at)
            VALUES ($1, $2, 'in_progress', $3, $3)
            RETURNING run_id, task_id, status, created_at, updated_at
            "#,
        )
        .bind(run_id)
        .bind(task_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| "Failed to create task run.")?;

        Ok(raw_run.into())
    }

    /// Updates a task run's terminal status to `COMPLETED` or `ERRORED`.
    pub async fn update_task_run_status(
        &self,
        run_id: Uuid,
        status: TaskRunStatus,
    ) -> anyhow::Result<()> {
        if matches!(status, TaskRunStatus::Initialised) {
            bail!("Task runs cannot be reset back to `INITIALISED`.");
        }

        let now = Database::utc_now()?;
        sqlx::query("UPDATE task_runs SET status = $2, updated_at = $3 WHERE run_id = $1")
            .bind(run_id)
            .bind(status)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| "Failed to update task run status.")?;

        Ok(())
    }

    /// Returns the task run with the given id, if any. Mainly used by tests asserting the
    /// "exactly one `IN_PROGRESS` run" invariant.
    pub async fn get_task_run(&self, run_id: Uuid) -> anyhow::Result<Option<TaskRun>> {
        let raw_run = sqlx::query_as::<_, RawTaskRun>(
            "SELECT run_id, task_id, status, created_at, updated_at FROM task_runs WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| "Failed to fetch task run.")?;

        Ok(raw_run.map(Into::into))
    }

    /// Returns the most recently created run for a task, if any; backs the execution status
    /// lookup.
    pub async fn latest_task_run(&self, task_id: Uuid) -> anyhow::Result<Option<TaskRun>> {
        let raw_run = sqlx::query_as::<_, RawTaskRun>(
            r#"
            SELECT run_id, task_id, status, created_at, updated_at FROM task_runs
            WHERE task_id = $1 ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| "Failed to fetch latest task run.")?;

        Ok(raw_run.map(Into::into))
    }

    /// Counts `IN_PROGRESS` runs for a task; used to assert the single-active-run invariant in
    /// tests.
    pub async fn count_in_progress_task_runs(&self, task_id: Uuid) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM task_runs WHERE task_id = $1 AND status = 'in_progress'",
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await
        .with_context(|| "Failed to count in-progress task runs.")?;

        Ok(count)
    }

    /// Returns every `ACTIVE` task, for the scheduler to rebuild jobs for at startup. The
    /// scheduler store itself is not consulted: a task's own row is the source of truth for what
    /// should be scheduled, not the job store's persisted `JobStoredData` rows.
    pub async fn active_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let raw_tasks = sqlx::query_as::<_, RawTask>(
            r#"
            SELECT task_id, email_id, cron_expression, status, email_request, scheduler_job_id, start_time, expiry_time, created_at, updated_at
            FROM tasks WHERE status = 'active' ORDER BY task_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .with_context(|| "Failed to fetch active tasks.")?;

        raw_tasks.into_iter().map(Task::try_from).collect()
    }

    /// Returns every task's current status, keyed by id. Used by the scheduler's refresh sweep
    /// to decide whether a locally known job's task has left the active-status family
    /// (`TaskStatus::is_active`), rather than re-deriving that check from a second hardcoded SQL
    /// status literal that could drift out of sync with the enum.
    pub async fn task_statuses(&self) -> anyhow::Result<HashMap<Uuid, TaskStatus>> {
        let rows: Vec<(Uuid, TaskStatus)> = sqlx::query_as("SELECT task_id, status FROM tasks")
            .fetch_all(&self.pool)
            .await
            .with_context(|| "Failed to fetch task statuses.")?;

        Ok(rows.into_iter().collect())
    }

    /// Crash recovery for a process that died mid-firing: reverts any `EXECUTING` task back to
    /// `ACTIVE` and marks its in-flight run `ERRORED`, so the scheduler's next resume pass
    /// rebuilds a job for it. Returns the recovered task ids, for startup logging only.
    pub async fn recover_interrupted_tasks(&self) -> anyhow::Result<Vec<Uuid>> {
        let now = Database::utc_now()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| "Failed to start transaction.")?;

        sqlx::query(
            r#"
            UPDATE task_runs SET status = 'errored', updated_at = $1
            WHERE status = 'in_progress'
              AND task_id IN (SELECT task_id FROM tasks WHERE status = 'executing')
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| "Failed to mark interrupted task runs errored.")?;

        let recovered: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE tasks SET status = 'active', updated_at = $1
            WHERE status = 'executing'
            RETURNING task_id
            "#,
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .with_context(|| "Failed to revert interrupted tasks to active.")?;

        tx.commit()
            .await
            .with_context(|| "Failed to commit interrupted task recovery.")?;

        Ok(recovered.into_iter().map(|(id,)| id).collect())
    }

    /// Unconditionally rebinds a task's scheduler job id. Distinct from `activate_task`, which
    /// only transitions a task out of `INITIALISED`: this is used when the scheduler rebuilds a
    /// fresh job for an already-`ACTIVE` task at resume.
    pub async fn rebind_scheduler_job(
        &self,
        task_id: Uuid,
        scheduler_job_id: &str,
    ) -> anyhow::Result<()> {
        let now = Database::utc_now()?;
        sqlx::query("UPDATE tasks SET scheduler_job_id = $2, updated_at = $3 WHERE task_id = $1")
            .bind(task_id)
            .bind(scheduler_job_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| "Failed to rebind scheduler job.")?;

        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use crate::{
        database::Database,
        tasks::{email_request::tests::mock_email_request, TaskRunStatus, TaskStatus},
    };
    use sqlx::PgPool;
    use uuid::Uuid;

    #[sqlx::test]
    async fn creates_task_in_initialised_status(pool: PgPool) -> anyhow::Result<()> {
        let db = Database::create(pool).await?;
        let task_id = Uuid::now_v7();
        let task = db
            .create_task(
                task_id,
                "alice@new-corp.test",
                "30 9 * * 1",
                &mock_email_request(),
                None,
                None,
            )
            .await?;

        assert_eq!(task.status, TaskStatus::Initialised);
        assert!(task.email_request.is_some());
        assert!(task.scheduler_job_id.is_none());

        Ok(())
    }

    #[sqlx::test]
    async fn activate_then_execute_then_finish_clears_payload(pool: PgPool) -> anyhow::Result<()> {
        let db = Database::create(pool).await?;
        let task_id = Uuid::now_v7();
        db.create_task(
            task_id,
            "alice@new-corp.test",
            "0 9 15 6 *",
            &mock_email_request(),
            None,
            None,
        )
        .await?;

        assert!(db.activate_task(task_id, "job-1").await?);
        assert!(db.begin_task_execution(task_id).await?);
        // Firing again while executing must not re-enter.
        assert!(!db.begin_task_execution(task_id).await?);

        db.finish_task(task_id).await?;
        let task = db.get_task(task_id).await?.unwrap();
        assert_eq!(task.status, TaskStatus::Finished);
        assert!(task.email_request.is_none());
        assert!(task.scheduler_job_id.is_none());

        Ok(())
    }

    #[sqlx::test]
    async fn recurring_task_returns_to_active_after_execution(pool: PgPool) -> anyhow::Result<()> {
        let db = Database::create(pool).await?;
        let task_id = Uuid::now_v7();
        db.create_task(
            task_id,
            "alice@new-corp.test",
            "30 9 * * 1",
            &mock_email_request(),
            None,
            None,
        )
        .await?;
        db.activate_task(task_id, "job-1").await?;
        db.begin_task_execution(task_id).await?;
        db.revert_task_to_active(task_id).await?;

        let task = db.get_task(task_id).await?.unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        assert!(task.email_request.is_some());
        assert_eq!(task.scheduler_job_id.as_deref(), Some("job-1"));

        Ok(())
    }

    #[sqlx::test]
    async fn delete_clears_payload_regardless_of_status(pool: PgPool) -> anyhow::Result<()> {
        let db = Database::create(pool).await?;
        let task_id = Uuid::now_v7();
        db.create_task(
            task_id,
            "alice@new-corp.test",
            "30 9 * * 1",
            &mock_email_request(),
            None,
            None,
        )
        .await?;
        db.activate_task(task_id, "job-1").await?;

        assert!(db.delete_task(task_id).await?);
        // Deleting an already-deleted task is a no-op.
        assert!(!db.delete_task(task_id).await?);

        let task = db.get_task(task_id).await?.unwrap();
        assert_eq!(task.status, TaskStatus::Deleted);
        assert!(task.email_request.is_none());
        assert!(task.scheduler_job_id.is_none());

        Ok(())
    }

    #[sqlx::test]
    async fn at_most_one_in_progress_run_per_task(pool: PgPool) -> anyhow::Result<()> {
        let db = Database::create(pool).await?;
        let task_id = Uuid::now_v7();
        db.create_task(
            task_id,
            "alice@new-corp.test",
            "30 9 * * 1",
            &mock_email_request(),
            None,
            None,
        )
        .await?;

        let run = db.create_task_run(task_id).await?;
        assert_eq!(db.count_in_progress_task_runs(task_id).await?, 1);

        db.update_task_run_status(run.run_id, TaskRunStatus::Completed)
            .await?;
        assert_eq!(db.count_in_progress_task_runs(task_id).await?, 0);

        Ok(())
    }

    #[sqlx::test]
    async fn task_statuses_reports_executing_as_a_distinct_status_from_active(
        pool: PgPool,
    ) -> anyhow::Result<()> {
        let db = Database::create(pool).await?;
        let task_id = Uuid::now_v7();
        db.create_task(
            task_id,
            "alice@new-corp.test",
            "30 9 * * 1",
            &mock_email_request(),
            None,
            None,
        )
        .await?;
        db.activate_task(task_id, "job-1").await?;
        db.begin_task_execution(task_id).await?;

        let statuses = db.task_statuses().await?;
        let status = *statuses.get(&task_id).expect("task must be present");
        assert_eq!(status, TaskStatus::Executing);
        // `EXECUTING` is still part of the active-status family, even though it is distinct from
        // the literal `ACTIVE` used by `active_tasks()`.
        assert!(status.is_active());

        Ok(())
    }
}
