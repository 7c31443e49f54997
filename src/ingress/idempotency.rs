use crate::redis::RedisStore;
use time::OffsetDateTime;
use uuid::Uuid;

/// Current state of a message's idempotency ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyState {
    /// The message has never been seen before; the caller may proceed and should mark it
    /// `queued` before handing off to the worker.
    Absent,
    /// The message is already queued but hasn't finished processing.
    Queued,
    /// The message has already been processed to completion.
    Processed,
}

/// Derives a stable fingerprint for a message that didn't carry its own `messageId`,
/// from the fields that together identify "the same email" well enough to dedupe retries: the
/// normalized sender, recipient, subject, date, bodies, and attachment count.
pub fn derive_message_id(
    normalized_sender: &str,
    to: &str,
    subject: &str,
    date: Option<&str>,
    html_content: Option<&str>,
    text_content: Option<&str>,
    attachment_count: usize,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalized_sender.as_bytes());
    hasher.update(b"\0");
    hasher.update(to.as_bytes());
    hasher.update(b"\0");
    hasher.update(subject.as_bytes());
    hasher.update(b"\0");
    hasher.update(date.unwrap_or_default().as_bytes());
    hasher.update(b"\0");
    hasher.update(html_content.unwrap_or_default().as_bytes());
    hasher.update(b"\0");
    hasher.update(text_content.unwrap_or_default().as_bytes());
    hasher.update(b"\0");
    hasher.update(&attachment_count.to_le_bytes());

    format!("<{}@mxtoai.com>", hasher.finalize().to_hex())
}

/// Builds the always-fresh `messageId` a scheduled re-execution's self-callback carries, so that
/// the idempotency gate never mistakes a legitimate re-fire for a duplicate of the original
/// request that created the task.
pub fn derive_scheduled_message_id(task_id: Uuid, now: OffsetDateTime) -> anyhow::Result<String> {
    let iso = now
        .format(&time::format_description::well_known::Iso8601::DEFAULT)
        .map_err(|err| anyhow::anyhow!("Failed to format timestamp: {err}"))?;
    Ok(format!("<scheduled-{task_id}-{iso}@mxtoai.com>"))
}

/// Idempotency ledger backed by the shared key-value store. A Redis key is used rather
/// than a relational row so the absent→queued transition can be a single atomic `SET NX`: two
/// concurrent deliveries of the same message must never both observe `Absent`.
pub struct IdempotencyLedger<'a> {
    redis: &'a RedisStore,
}

/// Entries are kept for 7 days, refreshed rather than extended on every transition.
const TTL_SECONDS: u64 = 60 * 60 * 24 * 7;

impl<'a> IdempotencyLedger<'a> {
    pub fn new(redis: &'a RedisStore) -> Self {
        Self { redis }
    }

    fn key(message_id: &str) -> String {
        format!("idempotency:{message_id}")
    }

    /// Returns the current state for `message_id`.
    pub async fn state(&self, message_id: &str) -> anyhow::Result<IdempotencyState> {
        match self.redis.get(&Self::key(message_id)).await?.as_deref() {
            None => Ok(IdempotencyState::Absent),
            Some("queued") => Ok(IdempotencyState::Queued),
            Some(_) => Ok(IdempotencyState::Processed),
        }
    }

    /// Atomically checks and, when absent, marks `message_id` as `queued`, in a single round
    /// trip. This is the entry point the ingress validator sequence calls: a separate read-then-
    /// write (`state()` followed by an unconditional mark) would let two concurrent deliveries of
    /// the same message both observe `Absent` and both proceed.
    pub async fn check_and_mark_queued(&self, message_id: &str) -> anyhow::Result<IdempotencyState> {
        if self
            .redis
            .set_if_absent(&Self::key(message_id), "queued", TTL_SECONDS)
            .await?
        {
            return Ok(IdempotencyState::Absent);
        }
        self.state(message_id).await
    }

    /// Marks `message_id` as `processed`, regardless of its previous state. Called by the
    /// worker once the agent invocation has terminated, successfully or not - a failed
    /// processing attempt is still "handled" from the ingress's point of view; there are no
    /// retries at ingress.
    pub async fn mark_processed(&self, message_id: &str) -> anyhow::Result<()> {
        self.redis
            .set(&Self::key(message_id), "processed", TTL_SECONDS)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::{derive_message_id, derive_scheduled_message_id, IdempotencyLedger, IdempotencyState};
    use crate::redis::RedisStore;
    use time::macros::datetime;
    use uuid::Uuid;

    #[test]
    fn derived_message_id_is_deterministic_and_wrapped() {
        let a = derive_message_id(
            "alice@new-corp.test",
            "ask@mxtoai.com",
            "Hello",
            Some("2026-01-15"),
            None,
            Some("body"),
            0,
        );
        let b = derive_message_id(
            "alice@new-corp.test",
            "ask@mxtoai.com",
            "Hello",
            Some("2026-01-15"),
            None,
            Some("body"),
            0,
        );
        assert_eq!(a, b);
        assert!(a.starts_with('<') && a.ends_with("@mxtoai.com>"));
    }

    #[test]
    fn derived_message_id_changes_with_attachment_count() {
        let a = derive_message_id("alice@new-corp.test", "ask@mxtoai.com", "Hello", None, None, None, 0);
        let b = derive_message_id("alice@new-corp.test", "ask@mxtoai.com", "Hello", None, None, None, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn scheduled_message_id_is_unique_per_call_site() {
        let task_id = Uuid::now_v7();
        let now = datetime!(2026-01-15 10:30:00 UTC);
        let message_id = derive_scheduled_message_id(task_id, now).unwrap();
        assert!(message_id.starts_with(&format!("<scheduled-{task_id}-")));
        assert!(message_id.ends_with("@mxtoai.com>"));
    }

    #[tokio::test]
    #[ignore = "requires a local Redis instance"]
    async fn check_and_mark_queued_only_lets_one_caller_proceed() {
        let redis = RedisStore::create("redis://127.0.0.1:6379")
            .await
            .expect("Redis must be reachable for idempotency tests.");
        let ledger = IdempotencyLedger::new(&redis);
        let message_id = "<idempotency-race-test@new-corp.test>";
        redis.delete(&IdempotencyLedger::key(message_id)).await.unwrap();

        assert_eq!(
            ledger.check_and_mark_queued(message_id).await.unwrap(),
            IdempotencyState::Absent
        );
        // A second caller observing the same fingerprint after it has been marked must see
        // `Queued`, never a second `Absent` that would let it proceed too.
        assert_eq!(
            ledger.check_and_mark_queued(message_id).await.unwrap(),
            IdempotencyState::Queued
        );

        ledger.mark_processed(message_id).await.unwrap();
        assert_eq!(
            ledger.check_and_mark_queued(message_id).await.unwrap(),
            IdempotencyState::Processed
        );
    }
}
