mod handlers;
mod server_state;

use crate::{
    agent::NoopAgent,
    api::Api,
    config::{Config, RawConfig},
    database::Database,
    http_client::create_http_client,
    queue::InProcessQueue,
    scheduler::Scheduler,
    server::handlers::TaskmailOpenApi,
    smtp::Smtp,
    worker::WorkerPool,
};
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use lettre::{
    transport::smtp::{authentication::Credentials, client::Tls},
    AsyncSmtpTransport, Tokio1Executor,
};
use std::{sync::Arc, time::Duration};
use tracing::info;
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

pub use server_state::{ServerState, Status};

/// Boots the whole process: database, shared key-value store, optional SMTP transport, the
/// scheduler runner, the in-process worker pool, and the HTTP server - all from one `main`.
pub async fn run(raw_config: RawConfig) -> anyhow::Result<()> {
    let db_url = format!(
        "postgres://{}@{}:{}/{}",
        if let Some(ref password) = raw_config.db.password {
            format!(
                "{}:{}",
                urlencoding::encode(&raw_config.db.username),
                urlencoding::encode(password)
            )
        } else {
            raw_config.db.username.clone()
        },
        raw_config.db.host,
        raw_config.db.port,
        urlencoding::encode(&raw_config.db.name)
    );
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(raw_config.db.max_connections)
        .connect(&db_url)
        .await
        .with_context(|| "Failed to connect to the database.")?;
    let database = Database::create(pool).await?;

    let smtp = if let Some(ref smtp_config) = raw_config.smtp {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_config.host)?
            .credentials(Credentials::new(smtp_config.username.clone(), smtp_config.password.clone()));
        if let Some(port) = smtp_config.port {
            builder = builder.port(port);
        }
        if smtp_config.no_tls {
            builder = builder.tls(Tls::None);
        }
        Some(Smtp::new(builder.build(), smtp_config.clone()))
    } else {
        None
    };

    let redis = crate::redis::RedisStore::create(&raw_config.redis.url).await?;
    let http_client = create_http_client(Duration::from_secs(30))?;
    let db_config = raw_config.db.clone();
    let ingress_api_key = raw_config.ingress.api_key.clone();
    let attachments_path = raw_config.ingress.attachments_path.clone();
    let scheduler_config = raw_config.scheduler.clone();
    let http_port = raw_config.port;
    let bind_address = raw_config.bind_address.clone();

    let scheduler_runtime = crate::scheduler::SchedulerRuntime::new(
        database.clone(),
        http_client.clone(),
        scheduler_config,
        db_config,
        ingress_api_key,
        attachments_path,
    );
    let scheduler = Scheduler::start(scheduler_runtime).await?;
    let scheduler_registrar = scheduler.registrar();

    let (queue, receiver) = InProcessQueue::new(1024);
    let config = Config::from(raw_config);

    let api = Arc::new(Api::new(
        config.clone(),
        database,
        redis,
        http_client,
        smtp,
        Arc::new(queue),
        scheduler_registrar,
    ));

    let agent: Arc<dyn crate::agent::Agent> = Arc::new(NoopAgent);
    let reply_sender: Arc<dyn crate::agent::ReplySender> = Arc::new(NoopAgent);
    WorkerPool::new(config.scheduler.max_workers as usize).spawn(api.clone(), agent, reply_sender, receiver);

    let state = web::Data::new(ServerState::new(api, scheduler));
    let http_server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Compat::new(TracingLogger::default()))
            .wrap(middleware::Compat::new(middleware::Compress::default()))
            .wrap(middleware::NormalizePath::trim())
            .app_data(state.clone())
            .service(RapiDoc::with_openapi("/api-docs/openapi.json", TaskmailOpenApi::openapi()))
            .service(handlers::health::health)
            .service(handlers::process_email::process_email)
            .wrap(Cors::permissive())
    });

    let bind_to = format!("{bind_address}:{http_port}");
    let http_server = http_server
        .bind(&bind_to)
        .with_context(|| format!("Failed to bind to {bind_to}."))?;

    info!("taskmail is available at http://{bind_to}");

    http_server.run().await.with_context(|| "Failed to run the taskmail server.")
}
