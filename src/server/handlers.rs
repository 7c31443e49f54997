pub mod health;
pub mod process_email;

use crate::server::{server_state::Status, handlers::process_email::ProcessEmailAccepted};
use utoipa::OpenApi;

/// Aggregates every route's `#[utoipa::path]` annotation into one served document.
#[derive(OpenApi)]
#[openapi(
    info(title = "taskmail"),
    paths(health::health, process_email::process_email),
    components(schemas(Status, ProcessEmailAccepted))
)]
pub(super) struct TaskmailOpenApi;
