use crate::{
    config::Config, database::Database, queue::WorkQueue, redis::RedisStore,
    scheduler::SchedulerRegistrar, smtp::Smtp,
};
use reqwest_middleware::ClientWithMiddleware;
use std::sync::Arc;

/// Central dependency-injection hub every handler, tool, and background job is built on top of.
/// Mirrors the role the upstream `Api` struct plays, but this system has no DNS-resolution or web
/// page fetching need, so the generic resolver parameter is dropped; SMTP stays concrete rather
/// than trait-abstracted, matching how the upstream test suite mocks it (a real transport pointed
/// at a local mock server) rather than through a trait object.
pub struct Api {
    pub db: Database,
    pub config: Config,
    pub redis: RedisStore,
    pub http_client: ClientWithMiddleware,
    pub smtp: Option<Smtp>,
    pub queue: Arc<dyn WorkQueue>,
    pub scheduler: SchedulerRegistrar,
}

impl Api {
    /// Instantiates the API collection with the specified config and collaborators.
    pub fn new(
        config: Config,
        db: Database,
        redis: RedisStore,
        http_client: ClientWithMiddleware,
        smtp: Option<Smtp>,
        queue: Arc<dyn WorkQueue>,
        scheduler: SchedulerRegistrar,
    ) -> Self {
        Self {
            config,
            db,
            redis,
            http_client,
            smtp,
            queue,
            scheduler,
        }
    }

    /// Extension methods for the task lifecycle.
    pub fn tasks(&self) -> crate::tasks::api_ext::TasksApi {
        crate::tasks::api_ext::TasksApi::new(self)
    }

    /// Extension methods for the ingress validator pipeline.
    pub fn ingress(&self) -> crate::ingress::api_ext::IngressApi {
        crate::ingress::api_ext::IngressApi::new(self)
    }
}

impl AsRef<Api> for Api {
    fn as_ref(&self) -> &Self {
        self
    }
}

#[cfg(test)]
pub mod tests {
    use crate::{
        api::Api,
        config::{tests::mock_config, DatabaseConfig},
        database::Database,
        http_client::create_http_client,
        queue::InProcessQueue,
        redis::RedisStore,
        scheduler::{SchedulerRegistrar, SchedulerRuntime},
    };
    use sqlx::PgPool;
    use std::{path::PathBuf, sync::Arc, time::Duration};

    /// Builds an `Api` for tests. Requires a reachable Redis instance (no ephemeral-per-test
    /// macro exists for Redis, unlike Postgres); tests that exercise Redis-backed paths are
    /// expected to flush their own key prefixes between runs. The scheduler registrar is
    /// `Detached`, so tests that schedule a task spin up a short-lived scheduler bound to the
    /// same ephemeral database rather than requiring a long-lived one running alongside them.
    pub async fn mock_api(pool: PgPool) -> anyhow::Result<Api> {
        let redis = RedisStore::create("redis://127.0.0.1:6379").await?;
        let config = mock_config()?;
        let http_client = create_http_client(Duration::from_secs(5))?;
        let connect_options = pool.connect_options();
        let db_config = DatabaseConfig {
            name: connect_options
                .get_database()
                .unwrap_or_default()
                .to_string(),
            host: connect_options.get_host().to_string(),
            port: connect_options.get_port(),
            username: connect_options.get_username().to_string(),
            password: None,
            max_connections: 10,
        };
        let db = Database::create(pool).await?;

        let scheduler_runtime = SchedulerRuntime::new(
            db.clone(),
            http_client.clone(),
            config.scheduler.clone(),
            db_config,
            config.ingress.api_key.clone(),
            PathBuf::from("./attachments"),
        );
        let (queue, _receiver) = InProcessQueue::new(128);

        Ok(Api::new(
            config,
            db,
            redis,
            http_client,
            None,
            Arc::new(queue),
            SchedulerRegistrar::Detached(scheduler_runtime),
        ))
    }
}
