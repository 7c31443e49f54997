use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`Task`](super::Task).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Initialised,
    Active,
    Executing,
    Finished,
    Deleted,
}

impl TaskStatus {
    /// A task in an active status still has a live scheduler job and a populated email request.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Initialised | Self::Active | Self::Executing)
    }

    /// A task in a terminal status must have its `email_request` cleared and its
    /// `scheduler_job_id` unset.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Deleted)
    }
}
