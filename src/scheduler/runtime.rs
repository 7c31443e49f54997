use crate::{
    config::{DatabaseConfig, SchedulerConfig},
    cron_ext::is_one_shot,
    database::Database,
    ingress::idempotency::derive_scheduled_message_id,
    tasks::{EmailRequest, Task, TaskRunStatus},
};
use reqwest::multipart::Form;
use reqwest_middleware::ClientWithMiddleware;
use std::path::PathBuf;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// The small slice of `Api`'s collaborators the scheduler's own job closures need.
/// Kept separate from the full `Api` so that scheduler jobs - whose closures must be `'static`
/// and are built before the rest of the API surface exists - never need an owned `Arc<Api>`.
#[derive(Clone)]
pub struct SchedulerRuntime {
    pub db: Database,
    pub http_client: ClientWithMiddleware,
    pub config: SchedulerConfig,
    pub db_config: DatabaseConfig,
    pub ingress_api_key: String,
    pub attachments_path: PathBuf,
}

impl SchedulerRuntime {
    pub fn new(
        db: Database,
        http_client: ClientWithMiddleware,
        config: SchedulerConfig,
        db_config: DatabaseConfig,
        ingress_api_key: String,
        attachments_path: PathBuf,
    ) -> Self {
        Self {
            db,
            http_client,
            config,
            db_config,
            ingress_api_key,
            attachments_path,
        }
    }

    /// Fires a single scheduled task: reloads the task, guards against stale/expired/
    /// not-yet-due firings, transitions it into `EXECUTING`, re-issues the request to this
    /// system's own ingress with a fresh `messageId`, and returns the task to `ACTIVE` (recurring)
    /// or `FINISHED` (one-shot) regardless of the callback's outcome.
    pub async fn execute_scheduled_task(&self, task_id: Uuid) -> anyhow::Result<()> {
        let Some(task) = self.db.get_task(task_id).await? else {
            warn!(task.id = %task_id, "Scheduled task no longer exists; nothing to do.");
            return Ok(());
        };

        if !task.status.is_active() {
            debug!(task.id = %task_id, status = ?task.status, "Task is no longer active; clearing its stale job binding.");
            self.db.clear_stale_scheduler_job(task_id).await?;
            return Ok(());
        }

        let now = Database::utc_now()?;
        if let Some(expiry_time) = task.expiry_time {
            if now >= expiry_time {
                debug!(task.id = %task_id, "Task has expired; finishing without firing.");
                self.db.finish_task(task_id).await?;
                return Ok(());
            }
        }
        if let Some(start_time) = task.start_time {
            if now < start_time {
                debug!(task.id = %task_id, "Task isn't due to start yet; skipping this firing.");
                return Ok(());
            }
        }

        if !self.db.begin_task_execution(task_id).await? {
            debug!(task.id = %task_id, "Lost the race to fire this task; another firing is already in flight.");
            return Ok(());
        }

        let run = self.db.create_task_run(task_id).await?;

        let Some(mut email_request) = task.email_request.clone() else {
            error!(task.id = %task_id, "Active task is missing its email request payload.");
            self.db
                .update_task_run_status(run.run_id, TaskRunStatus::Errored)
                .await?;
            return self.after_firing(&task, false).await;
        };

        email_request.message_id = derive_scheduled_message_id(task_id, now)?;
        email_request.scheduled_task_id = Some(task_id);

        let succeeded = match self.post_self_callback(&email_request).await {
            Ok(()) => true,
            Err(err) => {
                error!(task.id = %task_id, "Scheduled task's self-callback failed: {err:?}");
                false
            }
        };
        let run_status = if succeeded {
            TaskRunStatus::Completed
        } else {
            TaskRunStatus::Errored
        };
        self.db
            .update_task_run_status(run.run_id, run_status)
            .await?;

        self.after_firing(&task, succeeded).await
    }

    /// On success: one-shot tasks finish, recurring tasks go back to `ACTIVE` for their next
    /// tick. On failure the task always returns to `ACTIVE` regardless of one-shot/recurring -
    /// a failed one-shot simply never fires again, since its trigger was already consumed.
    async fn after_firing(&self, task: &Task, succeeded: bool) -> anyhow::Result<()> {
        if succeeded && is_one_shot(&task.cron_expression) {
            self.db.finish_task(task.task_id).await?;
        } else {
            self.db.revert_task_to_active(task.task_id).await?;
        }
        Ok(())
    }

    /// Re-issues the email request against this system's own `/process-email` endpoint,
    /// re-reading any attachments from disk. A non-2xx response or transport error is
    /// reported as a failure; the caller decides what that means for the task's lifecycle.
    async fn post_self_callback(&self, email_request: &EmailRequest) -> anyhow::Result<()> {
        let form = self.build_self_callback_form(email_request).await?;
        let url = self.config.self_callback_base_url.join("process-email")?;

        let response = self
            .http_client
            .post(url)
            .timeout(self.config.self_callback_timeout)
            .header("x-api-key", &self.ingress_api_key)
            .multipart(form)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            anyhow::bail!(
                "Self-callback was rejected with HTTP {}.",
                response.status()
            );
        }
    }

    /// Builds the self-callback form body. Attachments are not carried into scheduled
    /// re-executions: a task whose original request had attachments fires without them,
    /// logged as a warning rather than silently dropped.
    async fn build_self_callback_form(&self, email_request: &EmailRequest) -> anyhow::Result<Form> {
        if !email_request.attachments.is_empty() {
            warn!(
                count = email_request.attachments.len(),
                "Scheduled re-execution is proceeding without its original attachments."
            );
        }

        let mut form = Form::new()
            .text("from_email", email_request.from_email.clone())
            .text("to", email_request.to.clone())
            .text("subject", email_request.subject.clone())
            .text("messageId", email_request.message_id.clone())
            .text(
                "scheduled_task_id",
                email_request.scheduled_task_id.unwrap_or(Uuid::nil()).to_string(),
            );

        if let Some(cc) = &email_request.cc {
            form = form.text("cc", cc.join(","));
        }
        if let Some(text_content) = &email_request.text_content {
            form = form.text("textContent", text_content.clone());
        }
        if let Some(html_content) = &email_request.html_content {
            form = form.text("htmlContent", html_content.clone());
        }
        if let Some(date) = &email_request.date {
            form = form.text("date", date.clone());
        }
        if let Some(raw_headers) = &email_request.raw_headers {
            form = form.text("rawHeaders", raw_headers.to_string());
        }

        Ok(form)
    }
}
