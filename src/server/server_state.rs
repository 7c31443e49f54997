use crate::{api::Api, scheduler::Scheduler};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;
use utoipa::ToSchema;

/// Shared, `actix-web`-extractable application state: an `Arc<Api>` plus a lockable live
/// `Scheduler` handle. The live `Scheduler` is kept here rather than on `Api` because only one
/// copy of it may ever run `.start()`/`.shutdown()`; everything else that needs to register or
/// unregister a job goes through the cheaply cloneable `SchedulerRegistrar` already held by `Api`.
pub struct ServerState {
    pub api: Arc<Api>,
    scheduler: RwLock<Scheduler>,
    version: String,
}

impl ServerState {
    pub fn new(api: Arc<Api>, scheduler: Scheduler) -> Self {
        Self {
            api,
            scheduler: RwLock::new(scheduler),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Point-in-time server status served by `GET /health`: returns 200 with a minimal status
    /// object.
    pub async fn status(&self) -> Status {
        let scheduler_status = self.scheduler.write().await.status().await;
        let (operational, time_till_next_job_ms) = match scheduler_status {
            Ok(status) => (status.operational, status.time_till_next_job.map(|d| d.as_millis() as u64)),
            Err(err) => {
                error!("Failed to read scheduler status: {err:?}");
                (false, None)
            }
        };

        Status {
            version: self.version.clone(),
            operational,
            time_till_next_job_ms,
        }
    }
}

/// Minimal status object returned by `GET /health`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Status {
    pub version: String,
    pub operational: bool,
    pub time_till_next_job_ms: Option<u64>,
}

#[cfg(test)]
pub mod tests {
    use super::ServerState;
    use crate::{api::tests::mock_api, scheduler::{tests::mock_scheduler_runtime, Scheduler}};
    use sqlx::PgPool;
    use std::sync::Arc;

    pub async fn mock_server_state(pool: PgPool) -> anyhow::Result<ServerState> {
        let api = Arc::new(mock_api(pool.clone()).await?);
        let scheduler = Scheduler::start(mock_scheduler_runtime(pool).await?).await?;
        Ok(ServerState::new(api, scheduler))
    }
}
