use actix_multipart::Multipart;
use actix_web::web::BytesMut;
use anyhow::Context;
use bytes::Bytes;
use futures::StreamExt;
use uuid::Uuid;

/// A single file part lifted off the multipart payload, still in memory: the ingress pipeline
/// doesn't touch disk until every validator upstream of the attachment-policy check has passed;
/// the attachments directory is owned exclusively by the ingress process.
#[derive(Debug, Clone)]
pub struct IncomingAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// The raw shape of a `POST /process-email` multipart request, decoded but not yet validated.
/// Field names match the wire contract exactly; `from`/`from_email` are collapsed onto the
/// single canonical field at parse time.
#[derive(Debug, Clone, Default)]
pub struct IncomingEmailRequest {
    pub from_email: String,
    pub to: String,
    pub subject: String,
    pub text_content: Option<String>,
    pub html_content: Option<String>,
    pub message_id: Option<String>,
    pub date: Option<String>,
    pub email_id: Option<String>,
    pub raw_headers: Option<String>,
    pub cc: Option<String>,
    pub scheduled_task_id: Option<Uuid>,
    pub attachments: Vec<IncomingAttachment>,
}

/// Reads every field of a multipart payload into memory, without ever naming a disk path - the
/// caller decides whether, and where, to persist the collected attachments once the rest of the
/// validator sequence has accepted the request.
pub async fn read_multipart(mut payload: Multipart) -> anyhow::Result<IncomingEmailRequest> {
    let mut request = IncomingEmailRequest::default();

    while let Some(field) = payload.next().await {
        let mut field = field.with_context(|| "Failed to read multipart field.")?;
        let field_name = field.name().unwrap_or_default().to_string();
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(|name| name.to_string());
        let content_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut data = BytesMut::new();
        while let Some(chunk) = field.next().await {
            data.extend_from_slice(&chunk.with_context(|| "Failed to read multipart chunk.")?);
        }
        let data = data.freeze();

        if let Some(filename) = filename.filter(|_| field_name == "files" || field_name == "file") {
            request.attachments.push(IncomingAttachment {
                filename,
                content_type,
                data,
            });
            continue;
        }

        let text = String::from_utf8(data.to_vec())
            .with_context(|| format!("Field `{field_name}` is not valid UTF-8."))?;
        match field_name.as_str() {
            "from_email" | "from" => request.from_email = text,
            "to" => request.to = text,
            "subject" => request.subject = text,
            "textContent" => request.text_content = Some(text),
            "htmlContent" => request.html_content = Some(text),
            "messageId" => request.message_id = Some(text),
            "date" => request.date = Some(text),
            "emailId" => request.email_id = Some(text),
            "rawHeaders" => request.raw_headers = Some(text),
            "cc" => request.cc = Some(text),
            "scheduled_task_id" => {
                request.scheduled_task_id = Uuid::parse_str(text.trim()).ok();
            }
            _ => {}
        }
    }

    Ok(request)
}

#[cfg(test)]
pub mod tests {
    use super::{IncomingAttachment, IncomingEmailRequest};

    pub fn mock_incoming_email_request() -> IncomingEmailRequest {
        IncomingEmailRequest {
            from_email: "alice@new-corp.test".to_string(),
            to: "ask@mxtoai.com".to_string(),
            subject: "hi".to_string(),
            text_content: Some("hello".to_string()),
            html_content: None,
            message_id: None,
            date: Some("2026-01-15T10:00:00Z".to_string()),
            email_id: None,
            raw_headers: None,
            cc: None,
            scheduled_task_id: None,
            attachments: vec![],
        }
    }

    pub fn mock_attachment(filename: &str) -> IncomingAttachment {
        IncomingAttachment {
            filename: filename.to_string(),
            content_type: "text/plain".to_string(),
            data: bytes::Bytes::from_static(b"hello world"),
        }
    }
}
