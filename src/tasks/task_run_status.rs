use serde::{Deserialize, Serialize};

/// Status of a single [`TaskRun`](super::TaskRun) execution attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    Initialised,
    InProgress,
    Completed,
    Errored,
}

#[cfg(test)]
mod tests {
    use super::TaskRunStatus;

    #[test]
    fn variants_round_trip_through_serde() {
        let value = serde_json::to_value(TaskRunStatus::InProgress).unwrap();
        assert_eq!(value, serde_json::json!("in_progress"));
    }
}
