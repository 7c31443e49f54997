use crate::tasks::TaskRunStatus;
use time::OffsetDateTime;
use uuid::Uuid;

/// One recorded execution attempt of a [`Task`](super::Task).
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub run_id: Uuid,
    pub task_id: Uuid,
    pub status: TaskRunStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
