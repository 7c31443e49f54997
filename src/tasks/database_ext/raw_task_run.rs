use crate::tasks::{TaskRun, TaskRunStatus};
use time::OffsetDateTime;
use uuid::Uuid;

/// Raw `task_runs` row as returned by `sqlx`, convertible to the domain [`TaskRun`] type.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct RawTaskRun {
    pub run_id: Uuid,
    pub task_id: Uuid,
    pub status: TaskRunStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<RawTaskRun> for TaskRun {
    fn from(raw: RawTaskRun) -> Self {
        TaskRun {
            run_id: raw.run_id,
            task_id: raw.task_id,
            status: raw.status,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        }
    }
}
