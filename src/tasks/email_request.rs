use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Normalized metadata of a single attachment saved alongside an [`EmailRequest`]. The file
/// content itself lives on disk in the attachments directory - only the pointer is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAttachmentMetadata {
    /// Original filename as provided by the sender.
    pub filename: String,
    /// Declared content type of the attachment.
    pub content_type: String,
    /// Size of the attachment, in bytes.
    pub size_bytes: u64,
    /// Path the attachment was persisted to, relative to the attachments root.
    pub stored_path: PathBuf,
}

/// The canonical, fully captured representation of an inbound email request. This is the
/// document stored verbatim as `Task.email_request` and handed off to the worker queue.
///
/// The source protocol accepts both `from` and `from_email` for the sender address; this type
/// only ever carries the canonical `from_email` field, the alternate name is accepted solely at
/// parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRequest {
    /// Normalized sender address.
    pub from_email: String,
    /// Recipient address (`to` header); its local-part is resolved to a handle.
    pub to: String,
    /// Parsed `cc` recipients, if the header was present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<String>>,
    /// Email subject.
    #[serde(default)]
    pub subject: String,
    /// Plain-text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    /// HTML body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    /// Effective message id: either supplied by the client verbatim, or the derived
    /// fingerprint, or - for scheduler re-entries - a freshly generated one.
    pub message_id: String,
    /// Raw `Date` header, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Parsed `rawHeaders` JSON object, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_headers: Option<serde_json::Value>,
    /// Attachments persisted alongside this request.
    #[serde(default)]
    pub attachments: Vec<EmailAttachmentMetadata>,
    /// Resolved handle (the alias table's key, e.g. `ask`) this request routes to.
    pub handle: String,
    /// Set by the scheduler on re-entry or carried through when a request already
    /// originated from a firing; its presence makes the recursive-scheduling guard
    /// and the idempotency bypass possible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_task_id: Option<Uuid>,
    /// Distilled instructions attached by the scheduling tool so that a future
    /// re-execution is interpreted as an agentic task regardless of the original alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distilled_future_task_instructions: Option<String>,
}

impl EmailRequest {
    /// Number of attachments, used as one of the idempotency fingerprint inputs.
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }
}
