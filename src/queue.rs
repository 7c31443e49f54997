use crate::tasks::EmailRequest;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A single unit of work handed off from the ingress pipeline to the worker pool: a validated,
/// not-yet-processed email request, plus the `message_id` its idempotency ledger entry is keyed
/// under so the worker can mark it `processed` once done.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub email_id: String,
    pub message_id: String,
    pub email_request: EmailRequest,
}

/// Capability trait for handing validated requests off to whatever durably queues them for the
/// worker pool to drain. The trait boundary keeps the concrete implementation swappable without
/// touching callers.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, item: WorkItem) -> anyhow::Result<()>;
}

/// In-process, `tokio::mpsc`-backed implementation. Durable only for the lifetime of the
/// process; multi-process deployments rely on each process owning its own attachments directory
/// and queue rather than a shared broker.
pub struct InProcessQueue {
    sender: mpsc::Sender<WorkItem>,
}

impl InProcessQueue {
    /// Creates a bounded channel pair; the returned `mpsc::Receiver` is handed to the worker pool.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WorkItem>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl WorkQueue for InProcessQueue {
    async fn enqueue(&self, item: WorkItem) -> anyhow::Result<()> {
        self.sender
            .send(item)
            .await
            .map_err(|_| anyhow::anyhow!("Worker pool is no longer accepting work."))
    }
}
