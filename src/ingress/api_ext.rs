use crate::{
    api::Api,
    config::Plan,
    error::Error as IngressError,
    ingress::{
        domain_of,
        idempotency::{derive_message_id, IdempotencyLedger, IdempotencyState},
        normalize_sender,
        rate_limiter::{RateLimitVerdict, RateLimiter},
        IncomingEmailRequest,
    },
    queue::WorkItem,
    tasks::{EmailAttachmentMetadata, EmailRequest},
    whitelist::WhitelistState,
};
use anyhow::bail;
use lettre::message::Mailbox;
use std::str::FromStr;
use time::OffsetDateTime;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

/// Every way `POST /process-email` can resolve, once the API key has already been checked by
/// the handler: either the request is accepted onto the durable queue, or one of the
/// validators in the fixed sequence produced a terminal response. Database/
/// key-value failures are not represented here - they bubble up as `anyhow::Error`s that the
/// handler turns into a 500.
#[derive(Debug, Clone)]
pub enum IngressOutcome {
    /// Validators passed; the request has been persisted and handed to the worker pool.
    Accepted {
        email_id: String,
        attachments_saved: usize,
    },
    /// A sender- or domain-level rate-limit dimension was exceeded (HTTP 429).
    RateLimited { message: String },
    /// The fingerprint was already queued (HTTP 409).
    DuplicateQueued { message_id: String },
    /// The fingerprint had already been processed to completion (HTTP 409).
    DuplicateProcessed { message_id: String },
    /// Whitelist gate rejection (HTTP 403): either the sender isn't enrolled at all, or is
    /// enrolled but not yet verified.
    NotWhitelisted {
        email: String,
        exists_in_whitelist: bool,
        is_verified: bool,
        rejection_sent: bool,
    },
    /// The recipient's local-part didn't resolve to a known handle (HTTP 400).
    UnsupportedHandle {
        handle: String,
        rejection_sent: bool,
    },
}

/// Extension methods implementing the `/process-email` validator pipeline and the
/// acceptance path (persist attachments, enqueue). Exposed off the shared `Api` handle so the
/// HTTP handler stays a thin adapter between the wire format and this logic.
pub struct IngressApi<'a> {
    api: &'a Api,
}

impl<'a> IngressApi<'a> {
    pub fn new(api: &'a Api) -> Self {
        Self { api }
    }

    /// Runs the validator sequence and, on acceptance, persists attachments and enqueues the
    /// request. The caller (the HTTP handler) has already checked the API key - that must happen
    /// before any other validation runs.
    pub async fn process_email(
        &self,
        incoming: IncomingEmailRequest,
        now: OffsetDateTime,
    ) -> anyhow::Result<IngressOutcome> {
        let normalized_sender = normalize_sender(&incoming.from_email);
        let domain = domain_of(&incoming.from_email);
        let plan = self.api.config.rate_limit.default_plan;

        // Step 2: rate limits.
        let rate_limiter = RateLimiter::new(&self.api.redis, &self.api.config.rate_limit);
        match rate_limiter
            .check_and_increment(&normalized_sender, domain.as_deref(), plan, now)
            .await?
        {
            RateLimitVerdict::Allowed => {}
            RateLimitVerdict::SenderExceeded { window, plan } => {
                return Ok(IngressOutcome::RateLimited {
                    message: format!("Rate limit exceeded \u{2014} sender {window} for {plan} plan"),
                });
            }
            RateLimitVerdict::DomainExceeded { window } => {
                return Ok(IngressOutcome::RateLimited {
                    message: format!(
                        "Rate limit exceeded \u{2014} domain {window} for {} plan",
                        plan.label()
                    ),
                });
            }
        }

        // Step 3: idempotency.
        let message_id = incoming.message_id.clone().unwrap_or_else(|| {
            derive_message_id(
                &normalized_sender,
                &incoming.to,
                &incoming.subject,
                incoming.date.as_deref(),
                incoming.html_content.as_deref(),
                incoming.text_content.as_deref(),
                incoming.attachments.len(),
            )
        });

        let bypasses_idempotency = incoming.scheduled_task_id.is_some();
        let ledger = IdempotencyLedger::new(&self.api.redis);
        if !bypasses_idempotency {
            match ledger.check_and_mark_queued(&message_id).await? {
                IdempotencyState::Absent => {}
                IdempotencyState::Queued => {
                    return Ok(IngressOutcome::DuplicateQueued { message_id });
                }
                IdempotencyState::Processed => {
                    return Ok(IngressOutcome::DuplicateProcessed { message_id });
                }
            }
        }

        // Step 4: whitelist.
        if self.api.config.whitelist.enabled {
            match self.api.db.whitelist_state(&normalized_sender).await? {
                WhitelistState::NotFound => {
                    let verification_token = self.api.db.whitelist_sender(&normalized_sender).await?;
                    let rejection_sent = self
                        .send_verification_email(&incoming.from_email, verification_token)
                        .await;
                    return Ok(IngressOutcome::NotWhitelisted {
                        email: incoming.from_email,
                        exists_in_whitelist: false,
                        is_verified: false,
                        rejection_sent,
                    });
                }
                WhitelistState::Unverified => {
                    let rejection_sent = self
                        .send_whitelist_pending_reminder(&incoming.from_email)
                        .await;
                    return Ok(IngressOutcome::NotWhitelisted {
                        email: incoming.from_email,
                        exists_in_whitelist: true,
                        is_verified: false,
                        rejection_sent,
                    });
                }
                WhitelistState::Verified => {}
            }
        }

        // Step 5: handle/alias recognition.
        let local_part = incoming
            .to
            .split('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let Some(handle_config) = self.api.config.ingress.handles.get(&local_part).cloned() else {
            let rejection_sent = self.send_unsupported_handle_email(&incoming.from_email, &local_part).await;
            return Ok(IngressOutcome::UnsupportedHandle {
                handle: local_part,
                rejection_sent,
            });
        };

        // Step 6: attachment policy.
        if handle_config.accepts_attachments && incoming.attachments.len() > self.api.config.ingress.max_attachments_count {
            bail!(IngressError::client(format!(
                "Too many attachments: {} exceeds the maximum of {}.",
                incoming.attachments.len(),
                self.api.config.ingress.max_attachments_count
            )));
        }
        if handle_config.accepts_attachments {
            for attachment in &incoming.attachments {
                if attachment.data.len() as u64 > self.api.config.ingress.max_attachment_size {
                    bail!(IngressError::client(format!(
                        "Attachment `{}` exceeds the maximum size of {} bytes.",
                        attachment.filename, self.api.config.ingress.max_attachment_size
                    )));
                }
            }
        }

        // Acceptance: persist attachments, build the canonical record, enqueue.
        let email_id = incoming
            .email_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        let attachments = if handle_config.accepts_attachments {
            match self.persist_attachments(&email_id, &incoming).await {
                Ok(attachments) => attachments,
                Err(err) => {
                    self.delete_attachments(&email_id).await;
                    return Err(err);
                }
            }
        } else {
            if !incoming.attachments.is_empty() {
                debug!(handle = %local_part, "Handle does not process attachments; dropping those received.");
            }
            Vec::new()
        };

        let cc = incoming.cc.as_deref().map(|header| {
            header
                .split(',')
                .map(|addr| addr.trim().to_string())
                .filter(|addr| !addr.is_empty())
                .collect::<Vec<_>>()
        });
        let raw_headers = incoming
            .raw_headers
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        let email_request = EmailRequest {
            from_email: incoming.from_email.clone(),
            to: incoming.to.clone(),
            cc,
            subject: incoming.subject.clone(),
            text_content: incoming.text_content.clone(),
            html_content: incoming.html_content.clone(),
            message_id: message_id.clone(),
            date: incoming.date.clone(),
            raw_headers,
            attachments: attachments.clone(),
            handle: handle_config.handler.clone(),
            scheduled_task_id: incoming.scheduled_task_id,
            distilled_future_task_instructions: None,
        };

        self.api
            .queue
            .enqueue(WorkItem {
                email_id: email_id.clone(),
                message_id,
                email_request,
            })
            .await?;

        Ok(IngressOutcome::Accepted {
            email_id,
            attachments_saved: attachments.len(),
        })
    }

    /// Persists every received attachment under `attachments_path/<email_id>/`. The
    /// directory is exclusively owned by this ingress call until the work item is handed off.
    async fn persist_attachments(
        &self,
        email_id: &str,
        incoming: &IncomingEmailRequest,
    ) -> anyhow::Result<Vec<EmailAttachmentMetadata>> {
        if incoming.attachments.is_empty() {
            return Ok(Vec::new());
        }

        let dir = self.api.config.ingress.attachments_path.join(email_id);
        fs::create_dir_all(&dir).await?;

        let mut saved = Vec::with_capacity(incoming.attachments.len());
        for attachment in &incoming.attachments {
            let stored_path = std::path::PathBuf::from(email_id).join(&attachment.filename);
            let absolute_path = self.api.config.ingress.attachments_path.join(&stored_path);
            let mut file = fs::File::create(&absolute_path).await?;
            file.write_all(&attachment.data).await?;
            saved.push(EmailAttachmentMetadata {
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
                size_bytes: attachment.data.len() as u64,
                stored_path,
            });
        }
        Ok(saved)
    }

    /// Best-effort cleanup of a partially written attachments directory after a failed save.
    async fn delete_attachments(&self, email_id: &str) {
        let dir = self.api.config.ingress.attachments_path.join(email_id);
        let _ = fs::remove_dir_all(&dir).await;
    }

    async fn send_verification_email(&self, to: &str, verification_token: Uuid) -> bool {
        let Some(smtp) = &self.api.smtp else {
            return false;
        };
        let Ok(mailbox) = Mailbox::from_str(to) else {
            warn!(email = %to, "Cannot parse recipient address for verification email.");
            return false;
        };
        let link = self
            .api
            .config
            .whitelist
            .frontend_url
            .join(&format!("whitelist/verify?token={verification_token}"))
            .unwrap_or_else(|_| self.api.config.whitelist.frontend_url.clone());
        smtp.send_best_effort(
            mailbox,
            "Please verify your email address".to_string(),
            format!("Verify your address to start using this service: {link}"),
        )
        .await;
        true
    }

    async fn send_whitelist_pending_reminder(&self, to: &str) -> bool {
        let Some(smtp) = &self.api.smtp else {
            return false;
        };
        let Ok(mailbox) = Mailbox::from_str(to) else {
            return false;
        };
        smtp.send_best_effort(
            mailbox,
            "Verification still pending".to_string(),
            format!(
                "Your email address hasn't been verified yet. Sign up again at {}.",
                self.api.config.whitelist.signup_url
            ),
        )
        .await;
        true
    }

    async fn send_unsupported_handle_email(&self, to: &str, handle: &str) -> bool {
        let Some(smtp) = &self.api.smtp else {
            return false;
        };
        let Ok(mailbox) = Mailbox::from_str(to) else {
            return false;
        };
        smtp.send_best_effort(
            mailbox,
            "Unsupported email handle".to_string(),
            format!("`{handle}` doesn't correspond to a recognized service handle."),
        )
        .await;
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        api::tests::mock_api,
        ingress::{api_ext::IngressOutcome, incoming::tests::mock_incoming_email_request},
    };
    use sqlx::PgPool;
    use time::OffsetDateTime;

    #[sqlx::test]
    async fn accepts_a_fresh_request_and_enqueues_it(pool: PgPool) -> anyhow::Result<()> {
        let mut api = mock_api(pool).await?;
        api.config.whitelist.enabled = false;
        let outcome = api
            .ingress()
            .process_email(mock_incoming_email_request(), OffsetDateTime::now_utc())
            .await?;

        assert!(matches!(
            outcome,
            IngressOutcome::Accepted {
                attachments_saved: 0,
                ..
            }
        ));
        Ok(())
    }

    #[sqlx::test]
    async fn rejects_unknown_handles(pool: PgPool) -> anyhow::Result<()> {
        let mut api = mock_api(pool).await?;
        api.config.whitelist.enabled = false;
        let mut request = mock_incoming_email_request();
        request.to = "nobody-home@mxtoai.com".to_string();

        let outcome = api
            .ingress()
            .process_email(request, OffsetDateTime::now_utc())
            .await?;

        assert!(matches!(outcome, IngressOutcome::UnsupportedHandle { .. }));
        Ok(())
    }

    #[sqlx::test]
    async fn duplicate_message_id_is_rejected_on_resend(pool: PgPool) -> anyhow::Result<()> {
        let mut api = mock_api(pool).await?;
        api.config.whitelist.enabled = false;
        let mut request = mock_incoming_email_request();
        request.message_id = Some("<dup@new-corp.test>".to_string());

        let first = api
            .ingress()
            .process_email(request.clone(), OffsetDateTime::now_utc())
            .await?;
        assert!(matches!(first, IngressOutcome::Accepted { .. }));

        let second = api
            .ingress()
            .process_email(request, OffsetDateTime::now_utc())
            .await?;
        assert!(matches!(second, IngressOutcome::DuplicateQueued { .. }));
        Ok(())
    }

    #[sqlx::test]
    async fn scheduled_reentries_bypass_idempotency(pool: PgPool) -> anyhow::Result<()> {
        let mut api = mock_api(pool).await?;
        api.config.whitelist.enabled = false;
        let mut request = mock_incoming_email_request();
        request.message_id = Some("<scheduled-dup@new-corp.test>".to_string());
        request.scheduled_task_id = Some(uuid::Uuid::now_v7());

        let first = api
            .ingress()
            .process_email(request.clone(), OffsetDateTime::now_utc())
            .await?;
        assert!(matches!(first, IngressOutcome::Accepted { .. }));

        let second = api
            .ingress()
            .process_email(request, OffsetDateTime::now_utc())
            .await?;
        assert!(matches!(second, IngressOutcome::Accepted { .. }));
        Ok(())
    }
}
