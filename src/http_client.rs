use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::{SpanBackendWithUrl, TracingMiddleware};
use std::time::Duration;

/// Builds the HTTP client used for the scheduler's self-callback requests. Every request
/// carries a tracing span keyed by URL, matching how outbound task requests are instrumented
/// elsewhere in this codebase.
pub fn create_http_client(timeout: Duration) -> anyhow::Result<ClientWithMiddleware> {
    let inner = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(ClientBuilder::new(inner)
        .with(TracingMiddleware::<SpanBackendWithUrl>::new())
        .build())
}
