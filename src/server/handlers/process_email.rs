use crate::{ingress::api_ext::IngressOutcome, server::ServerState};
use actix_multipart::Multipart;
use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;

/// Body returned for a freshly accepted request (HTTP 200).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessEmailAccepted {
    pub message: String,
    pub email_id: String,
    pub attachments_saved: usize,
    pub status: String,
}

/// Ingests an inbound email and either queues it for processing or rejects it with one of the
/// validator responses. The API key is checked first, before any database or
/// key-value work, so unauthenticated load is as cheap as possible to reject.
#[utoipa::path(
    tags = ["ingress"],
    request_body(content_type = "multipart/form-data", description = "Inbound email, as forwarded by the mail relay"),
    responses(
        (status = 200, body = ProcessEmailAccepted, description = "request accepted and queued for processing"),
        (status = 400, description = "the recipient handle isn't recognized"),
        (status = 401, description = "missing or invalid `x-api-key`"),
        (status = 403, description = "sender isn't whitelisted, or isn't verified yet"),
        (status = 409, description = "duplicate of an already queued or processed request"),
        (status = 429, description = "a rate-limit dimension was exceeded"),
        (status = 500, description = "unexpected failure while processing the request"),
    )
)]
#[post("/process-email")]
pub async fn process_email(
    request: HttpRequest,
    state: web::Data<ServerState>,
    payload: Multipart,
) -> HttpResponse {
    let api_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if api_key != state.api.config.ingress.api_key {
        return HttpResponse::Unauthorized().json(json!({
            "message": "Invalid API key",
            "status": "error",
        }));
    }

    let incoming = match crate::ingress::read_multipart(payload).await {
        Ok(incoming) => incoming,
        Err(err) => {
            return HttpResponse::BadRequest().json(json!({
                "message": format!("Malformed request: {err}"),
                "status": "error",
            }));
        }
    };

    let now = crate::database::Database::utc_now().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    match state.api.ingress().process_email(incoming, now).await {
        Ok(IngressOutcome::Accepted {
            email_id,
            attachments_saved,
        }) => HttpResponse::Ok().json(ProcessEmailAccepted {
            message: "received and queued for processing".to_string(),
            email_id,
            attachments_saved,
            status: "processing".to_string(),
        }),
        Ok(IngressOutcome::DuplicateQueued { message_id }) => HttpResponse::Conflict().json(json!({
            "message": "Email is already queued for processing",
            "messageId": message_id,
            "status": "duplicate_queued",
        })),
        Ok(IngressOutcome::DuplicateProcessed { message_id }) => HttpResponse::Conflict().json(json!({
            "message": "Email has already been processed",
            "messageId": message_id,
            "status": "duplicate_processed",
        })),
        Ok(IngressOutcome::RateLimited { message }) => HttpResponse::TooManyRequests().json(json!({
            "message": message,
            "status": "error",
        })),
        Ok(IngressOutcome::NotWhitelisted {
            email,
            exists_in_whitelist,
            is_verified,
            rejection_sent,
        }) => {
            let message = if exists_in_whitelist {
                "Email rejected - Email not verified"
            } else {
                "Email rejected - Email not whitelisted"
            };
            HttpResponse::Forbidden().json(json!({
                "message": message,
                "email": email,
                "exists_in_whitelist": exists_in_whitelist,
                "is_verified": is_verified,
                "rejection_sent": rejection_sent,
            }))
        }
        Ok(IngressOutcome::UnsupportedHandle { handle, rejection_sent }) => HttpResponse::BadRequest().json(json!({
            "message": "Unsupported email handle",
            "handle": handle,
            "rejection_sent": rejection_sent,
        })),
        Err(err) => {
            error!("Failed to process inbound email: {err:?}");
            HttpResponse::InternalServerError().json(json!({
                "message": "Error processing email request",
                "error": err.to_string(),
                "attachments_saved": 0,
                "attachments_deleted": false,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::process_email;
    use crate::server::server_state::tests::mock_server_state;
    use actix_web::{
        test::{call_service, init_service, TestRequest},
        web, App,
    };
    use sqlx::PgPool;

    #[sqlx::test]
    async fn rejects_requests_with_a_bad_api_key(pool: PgPool) -> anyhow::Result<()> {
        let state = mock_server_state(pool).await?;
        let app = init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(process_email),
        )
        .await;

        let response = call_service(
            &app,
            TestRequest::post()
                .uri("/process-email")
                .insert_header(("x-api-key", "wrong-key"))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), 401);
        Ok(())
    }
}
