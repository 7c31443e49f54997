use crate::tasks::EmailRequest;
use async_trait::async_trait;
use tracing::info;

/// Outcome of a single agent invocation: this system only needs to know whether the
/// collaborator considers the request handled, not anything about what it produced - the reply
/// itself is delivered entirely through [`ReplySender`], a separate excluded collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentOutcome {
    pub handled: bool,
}

/// The LLM agent and its tools: explicitly out of scope, treated here only as a named
/// contract the worker pool depends on - an external collaborator kept behind a trait so the
/// rest of the system never has to know how it's implemented, only that it is.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Processes a validated email request, invoking whatever tools and external collaborators
    /// (web search, document OCR, attachment conversion, `ReplySender`) the request needs, and
    /// returns once the agent considers the request terminally handled.
    async fn run(&self, email_request: &EmailRequest, reply_sender: &dyn ReplySender) -> anyhow::Result<AgentOutcome>;
}

/// The external SMTP-like sender the agent uses to deliver its reply to the original sender.
/// Kept distinct from [`crate::smtp::Smtp`], which this system uses only for its own
/// reject/verification emails - the agent's replies are a separate, out-of-scope concern with
/// their own contract.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(&self, email_request: &EmailRequest, body: &str) -> anyhow::Result<()>;
}

/// Placeholder implementation of both collaborators, standing in for the excluded agent process.
/// Logs the request it would have handled and reports it as handled without doing anything else -
/// enough for the worker pool to exercise its own dispatch/idempotency logic end to end without a
/// real agent attached.
pub struct NoopAgent;

#[async_trait]
impl Agent for NoopAgent {
    async fn run(&self, email_request: &EmailRequest, _reply_sender: &dyn ReplySender) -> anyhow::Result<AgentOutcome> {
        info!(
            handle = %email_request.handle,
            message_id = %email_request.message_id,
            "Out-of-scope agent invocation stubbed out; marking request handled."
        );
        Ok(AgentOutcome { handled: true })
    }
}

#[async_trait]
impl ReplySender for NoopAgent {
    async fn send_reply(&self, email_request: &EmailRequest, _body: &str) -> anyhow::Result<()> {
        info!(message_id = %email_request.message_id, "Out-of-scope reply sender invocation stubbed out.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Agent, NoopAgent};
    use crate::tasks::EmailRequest;

    fn mock_email_request() -> EmailRequest {
        EmailRequest {
            from_email: "alice@new-corp.test".to_string(),
            to: "ask@mxtoai.com".to_string(),
            cc: None,
            subject: "hi".to_string(),
            text_content: Some("hello".to_string()),
            html_content: None,
            message_id: "<abc@new-corp.test>".to_string(),
            date: None,
            raw_headers: None,
            attachments: vec![],
            handle: "ask".to_string(),
            scheduled_task_id: None,
            distilled_future_task_instructions: None,
        }
    }

    #[tokio::test]
    async fn noop_agent_reports_requests_as_handled() {
        let agent = NoopAgent;
        let outcome = agent
            .run(&mock_email_request(), &NoopAgent)
            .await
            .unwrap();
        assert!(outcome.handled);
    }
}
