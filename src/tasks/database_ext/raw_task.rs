use crate::tasks::{EmailRequest, Task, TaskStatus};
use anyhow::Context;
use time::OffsetDateTime;
use uuid::Uuid;

/// Raw `tasks` row as returned by `sqlx`, convertible to the domain [`Task`] type.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct RawTask {
    pub task_id: Uuid,
    pub email_id: String,
    pub cron_expression: Option<String>,
    pub status: TaskStatus,
    pub email_request: Option<serde_json::Value>,
    pub scheduler_job_id: Option<String>,
    pub start_time: Option<OffsetDateTime>,
    pub expiry_time: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<RawTask> for Task {
    type Error = anyhow::Error;

    fn try_from(raw: RawTask) -> Result<Self, Self::Error> {
        let email_request = raw
            .email_request
            .map(serde_json::from_value::<EmailRequest>)
            .transpose()
            .with_context(|| format!("Task `{}` has a corrupted email request.", raw.task_id))?;

        Ok(Task {
            task_id: raw.task_id,
            email_id: raw.email_id,
            cron_expression: raw.cron_expression.unwrap_or_default(),
            status: raw.status,
            email_request,
            scheduler_job_id: raw.scheduler_job_id,
            start_time: raw.start_time,
            expiry_time: raw.expiry_time,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}
