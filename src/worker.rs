use crate::{
    agent::{Agent, ReplySender},
    api::Api,
    ingress::idempotency::{IdempotencyLedger, IdempotencyState},
    queue::WorkItem,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

/// Drains the work queue with a small pool of concurrent tasks. Each worker re-checks the
/// idempotency fingerprint before invoking the agent: a message already
/// marked `processed` by the time it's dequeued (a duplicate that slipped in between the
/// ingress's check and this one) is resolved as a synthetic no-op rather than run twice.
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Spawns `concurrency` tasks sharing one receiver, each looping until the queue's sender
    /// side is dropped. Returns immediately; the spawned tasks run for the lifetime of the
    /// process - the worker pool is in-process, not an external broker.
    pub fn spawn(&self, api: Arc<Api>, agent: Arc<dyn Agent>, reply_sender: Arc<dyn ReplySender>, receiver: mpsc::Receiver<WorkItem>) {
        let receiver = Arc::new(Mutex::new(receiver));
        for worker_id in 0..self.concurrency {
            let api = Arc::clone(&api);
            let agent = Arc::clone(&agent);
            let reply_sender = Arc::clone(&reply_sender);
            let receiver = Arc::clone(&receiver);
            tokio::spawn(async move {
                loop {
                    let item = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    let Some(item) = item else {
                        debug!(worker_id, "Work queue closed; worker shutting down.");
                        break;
                    };
                    process_work_item(&api, agent.as_ref(), reply_sender.as_ref(), item).await;
                }
            });
        }
    }
}

/// Processes a single dequeued item end to end: re-check idempotency, run the agent if not
/// already processed, and mark the fingerprint `processed` on completion regardless of outcome,
/// so a failed attempt is still considered "handled" from the ingress's point of view - there are
/// no retries at ingress.
async fn process_work_item(api: &Api, agent: &dyn Agent, reply_sender: &dyn ReplySender, item: WorkItem) {
    let ledger = IdempotencyLedger::new(&api.redis);

    match ledger.state(&item.message_id).await {
        Ok(IdempotencyState::Processed) => {
            info!(
                email.id = %item.email_id,
                message_id = %item.message_id,
                "Fingerprint already processed; returning a synthetic duplicate result."
            );
            return;
        }
        Ok(_) => {}
        Err(err) => {
            error!(email.id = %item.email_id, "Failed to read idempotency state before dispatch: {err:?}");
            return;
        }
    }

    let result = agent.run(&item.email_request, reply_sender).await;
    match &result {
        Ok(outcome) => info!(
            email.id = %item.email_id,
            message_id = %item.message_id,
            handled = outcome.handled,
            "Agent invocation finished."
        ),
        Err(err) => error!(
            email.id = %item.email_id,
            message_id = %item.message_id,
            "Agent invocation failed: {err:?}"
        ),
    }

    if let Err(err) = ledger.mark_processed(&item.message_id).await {
        error!(message_id = %item.message_id, "Failed to mark fingerprint processed: {err:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::{process_work_item, WorkerPool};
    use crate::{
        agent::NoopAgent,
        api::tests::mock_api,
        ingress::idempotency::{IdempotencyLedger, IdempotencyState},
        queue::WorkItem,
        tasks::EmailRequest,
    };
    use sqlx::PgPool;
    use std::sync::Arc;

    fn mock_email_request(message_id: &str) -> EmailRequest {
        EmailRequest {
            from_email: "alice@new-corp.test".to_string(),
            to: "ask@mxtoai.com".to_string(),
            cc: None,
            subject: "hi".to_string(),
            text_content: Some("hello".to_string()),
            html_content: None,
            message_id: message_id.to_string(),
            date: None,
            raw_headers: None,
            attachments: vec![],
            handle: "ask".to_string(),
            scheduled_task_id: None,
            distilled_future_task_instructions: None,
        }
    }

    #[sqlx::test]
    async fn marks_fingerprint_processed_after_dispatch(pool: PgPool) -> anyhow::Result<()> {
        let api = mock_api(pool).await?;
        let agent = NoopAgent;
        let message_id = "<worker-test-1@new-corp.test>";
        let item = WorkItem {
            email_id: "email-1".to_string(),
            message_id: message_id.to_string(),
            email_request: mock_email_request(message_id),
        };

        process_work_item(&api, &agent, &agent, item).await;

        let ledger = IdempotencyLedger::new(&api.redis);
        assert_eq!(ledger.state(message_id).await?, IdempotencyState::Processed);
        Ok(())
    }

    #[sqlx::test]
    async fn skips_agent_invocation_for_already_processed_fingerprint(pool: PgPool) -> anyhow::Result<()> {
        let api = mock_api(pool).await?;
        let agent = NoopAgent;
        let message_id = "<worker-test-2@new-corp.test>";
        let ledger = IdempotencyLedger::new(&api.redis);
        ledger.mark_processed(message_id).await?;

        let item = WorkItem {
            email_id: "email-2".to_string(),
            message_id: message_id.to_string(),
            email_request: mock_email_request(message_id),
        };
        process_work_item(&api, &agent, &agent, item).await;

        assert_eq!(ledger.state(message_id).await?, IdempotencyState::Processed);
        Ok(())
    }

    #[test]
    fn pool_requires_at_least_one_worker() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.concurrency, 1);
    }
}
