use crate::tasks::{EmailRequest, TaskStatus};
use time::OffsetDateTime;
use uuid::Uuid;

/// A persistent declaration that a given email request should be re-processed on a schedule.
/// Shared by the scheduler, the ingress, the scheduling tool, and the deletion tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Globally unique identifier, primary key.
    pub task_id: Uuid,
    /// Correlation key to the originating sender mailbox.
    pub email_id: String,
    /// Five-field cron expression (minute hour day-of-month month day-of-week).
    pub cron_expression: String,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// The full captured request payload. `None` iff `status.is_terminal()`.
    pub email_request: Option<EmailRequest>,
    /// Opaque handle into the scheduler's own job table. `None` between creation and scheduler
    /// attach, and cleared when the task reaches a terminal status.
    pub scheduler_job_id: Option<String>,
    /// Firings before this instant are skipped.
    pub start_time: Option<OffsetDateTime>,
    /// Firings after this instant transition the task to `FINISHED` instead of firing.
    pub expiry_time: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Task {
    /// Returns `true` if this task's `email_request` and `scheduler_job_id` are consistent with
    /// its current status. Used by tests and the executor's sanity checks.
    pub fn satisfies_terminal_invariant(&self) -> bool {
        if self.status.is_terminal() {
            self.email_request.is_none() && self.scheduler_job_id.is_none()
        } else {
            true
        }
    }
}
